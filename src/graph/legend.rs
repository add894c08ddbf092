use super::{Panel, PanelKind, FONT};
use anyhow::{Context, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::TextStyle;

const SWATCH: i32 = 12;
const ROW_HEIGHT: i32 = 20;
const ENTRY_GAP: i32 = 16;

/// Draw the legend strip along the top of `area` and return the remaining area.
/// Returns `area` untouched when there is nothing to list.
pub(super) fn draw_legend<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
) -> Result<DrawingArea<DB, Shift>>
where
    DB::ErrorType: 'static,
{
    let entries = legend_entries(panel);
    if entries.is_empty() {
        return Ok(area.clone());
    }

    let style = TextStyle::from((FONT, 12.0).into_font());
    let (width, _) = area.dim_in_pixel();
    let max_row = (width as i32 - 20).max(SWATCH * 4);

    // Greedy wrap into rows of (label, color, entry width).
    let mut rows: Vec<Vec<(&str, RGBAColor, i32)>> = vec![Vec::new()];
    let mut row_width = 0;
    for (label, color) in &entries {
        let (text_w, _) = area
            .estimate_text_size(label, &style)
            .context("Failed to measure legend text")?;
        let entry_w = SWATCH + 6 + text_w as i32;
        if row_width > 0 && row_width + ENTRY_GAP + entry_w > max_row {
            rows.push(Vec::new());
            row_width = 0;
        }
        if row_width > 0 {
            row_width += ENTRY_GAP;
        }
        row_width += entry_w;
        if let Some(row) = rows.last_mut() {
            row.push((label.as_str(), *color, entry_w));
        }
    }

    let legend_height = rows.len() as i32 * ROW_HEIGHT + 8;
    let (strip, rest) = area.split_vertically(legend_height);

    for (row_idx, row) in rows.iter().enumerate() {
        let total: i32 = row.iter().map(|(_, _, w)| w).sum::<i32>()
            + ENTRY_GAP * (row.len() as i32 - 1).max(0);
        let mut x = (width as i32 - total) / 2;
        let y = 4 + row_idx as i32 * ROW_HEIGHT;
        for (label, color, entry_w) in row {
            strip
                .draw(&Rectangle::new([(x, y), (x + SWATCH, y + SWATCH)], color.filled()))
                .context("Failed to draw legend swatch")?;
            strip
                .draw(&Text::new(label.to_string(), (x + SWATCH + 6, y), style.clone()))
                .context("Failed to draw legend label")?;
            x += entry_w + ENTRY_GAP;
        }
    }

    Ok(rest)
}

/// Segmented panels list their labels; everything else lists labelled series.
fn legend_entries(panel: &Panel) -> Vec<(String, RGBAColor)> {
    match panel.kind {
        PanelKind::Pie | PanelKind::Doughnut | PanelKind::PolarArea => {
            match panel.series.first() {
                Some(series) => panel
                    .labels
                    .iter()
                    .enumerate()
                    .map(|(i, label)| (label.clone(), series.fill_at(i)))
                    .collect(),
                None => Vec::new(),
            }
        }
        PanelKind::Cartesian | PanelKind::Radar => panel
            .series
            .iter()
            .filter_map(|s| s.label.as_ref().map(|l| (l.clone(), s.border_at(0))))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ColorValue;
    use crate::graph::{Series, SeriesPoint, SeriesStyle};

    #[test]
    fn test_segmented_entries_follow_labels() {
        let mut panel = Panel::new(PanelKind::Pie);
        panel.labels = vec!["X".into(), "Y".into()];
        let mut series = Series::new(SeriesStyle::Bar, vec![SeriesPoint::value(1.0); 2]);
        series.fill = Some(ColorValue::Many(vec!["red".into(), "blue".into()]));
        panel.series.push(series);

        let entries = legend_entries(&panel);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "X");
        assert_eq!((entries[1].1 .0, entries[1].1 .2), (0, 255));
    }

    #[test]
    fn test_unlabelled_series_are_skipped() {
        let mut panel = Panel::new(PanelKind::Cartesian);
        let mut named = Series::new(SeriesStyle::Line, vec![]);
        named.label = Some("Named".into());
        panel.series.push(named);
        panel.series.push(Series::new(SeriesStyle::Line, vec![]));
        let entries = legend_entries(&panel);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "Named");
    }
}
