use super::{format_value, Panel, PanelKind, Series, FONT};
use anyhow::{Context, Result};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::TextStyle;
use std::f64::consts::{FRAC_PI_2, TAU};

const DOUGHNUT_CUTOUT: f64 = 0.5;
const RADAR_RINGS: usize = 5;
/// Arc sampling step in radians.
const ARC_STEP: f64 = 0.03;

type Pixel = (i32, i32);

fn polar(center: (f64, f64), radius: f64, angle: f64) -> Pixel {
    (
        (center.0 + radius * angle.cos()).round() as i32,
        (center.1 + radius * angle.sin()).round() as i32,
    )
}

/// Outline of an annular sector from `start` to `end` (clockwise, radians).
fn sector(center: (f64, f64), inner: f64, outer: f64, start: f64, end: f64) -> Vec<Pixel> {
    let steps = (((end - start) / ARC_STEP).ceil() as usize).max(1);
    let angle = |k: usize| start + (end - start) * k as f64 / steps as f64;
    let mut outline: Vec<Pixel> = (0..=steps).map(|k| polar(center, outer, angle(k))).collect();
    if inner <= 0.0 {
        outline.push(polar(center, 0.0, 0.0));
    } else {
        outline.extend((0..=steps).rev().map(|k| polar(center, inner, angle(k))));
    }
    outline
}

/// (start, end) angle of each segment, starting at twelve o'clock.
/// Pie-like panels split by magnitude; polar area panels split evenly.
fn segment_angles(values: &[f64], equal: bool) -> Vec<(f64, f64)> {
    let total: f64 = values.iter().map(|v| v.abs()).sum();
    let mut start = -FRAC_PI_2;
    values
        .iter()
        .map(|v| {
            let sweep = if equal {
                TAU / values.len() as f64
            } else if total > 0.0 {
                v.abs() / total * TAU
            } else {
                0.0
            };
            let span = (start, start + sweep);
            start += sweep;
            span
        })
        .collect()
}

fn centered(size: f64) -> TextStyle<'static> {
    TextStyle::from((FONT, size).into_font()).pos(Pos::new(HPos::Center, VPos::Center))
}

fn visible(panel: &Panel) -> Vec<&Series> {
    panel
        .series
        .iter()
        .filter(|s| !s.hidden && !s.points.is_empty())
        .collect()
}

/// Pie, doughnut and polar area panels. Several datasets become concentric rings,
/// the first one outermost.
pub(super) fn draw_segments<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let (width, height) = area.dim_in_pixel();
    let center = (width as f64 / 2.0, height as f64 / 2.0);
    let radius = (width.min(height) as f64 / 2.0 - 10.0).max(1.0);
    let polar_area = panel.kind == PanelKind::PolarArea;
    let cutout = if panel.kind == PanelKind::Doughnut {
        radius * DOUGHNUT_CUTOUT
    } else {
        0.0
    };

    let rings = visible(panel);
    if rings.is_empty() {
        return Ok(());
    }

    if polar_area {
        let grid = RGBAColor(0, 0, 0, 0.1);
        for k in 1..=RADAR_RINGS {
            let r = radius * k as f64 / RADAR_RINGS as f64;
            area.draw(&Circle::new(
                polar(center, 0.0, 0.0),
                r.round() as i32,
                grid.stroke_width(1),
            ))
            .context("Failed to draw polar grid")?;
        }
    }

    let thickness = (radius - cutout) / rings.len() as f64;
    for (ring, series) in rings.iter().enumerate() {
        let values: Vec<f64> = series.points.iter().map(|p| p.y).collect();
        let outer = radius - ring as f64 * thickness;
        let inner = if polar_area { 0.0 } else { outer - thickness };
        let max = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let stroke = series.stroke();

        for (i, (start, end)) in segment_angles(&values, polar_area).into_iter().enumerate() {
            let reach = if polar_area {
                if max > 0.0 {
                    values[i].abs() / max * outer
                } else {
                    0.0
                }
            } else {
                outer
            };
            if end <= start || reach <= inner {
                continue;
            }
            let outline = sector(center, inner, reach, start, end);
            area.draw(&Polygon::new(outline.clone(), series.fill_at(i).filled()))
                .context("Failed to draw segment")?;
            if stroke > 0 {
                let mut closed = outline;
                if let Some(first) = closed.first().copied() {
                    closed.push(first);
                }
                area.draw(&PathElement::new(
                    closed,
                    series.border_at(i).stroke_width(stroke),
                ))
                .context("Failed to draw segment border")?;
            }
            if panel.data_labels {
                let mid = (start + end) / 2.0;
                let at = polar(center, (inner + reach) / 2.0, mid);
                area.draw(&Text::new(format_value(values[i]), at, centered(11.0)))
                    .context("Failed to draw data label")?;
            }
        }
    }

    Ok(())
}

/// Radar panels: one spoke per label, values scaled from zero to the largest value.
pub(super) fn draw_radar<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let (width, height) = area.dim_in_pixel();
    let center = (width as f64 / 2.0, height as f64 / 2.0);
    let radius = (width.min(height) as f64 / 2.0 - 40.0).max(1.0);
    let series = visible(panel);

    let spokes = series
        .iter()
        .map(|s| s.points.len())
        .max()
        .unwrap_or(0)
        .max(panel.labels.len());
    if spokes == 0 {
        return Ok(());
    }
    let angle = |i: usize| -FRAC_PI_2 + TAU * i as f64 / spokes as f64;

    let max = series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.y))
        .fold(0.0_f64, f64::max);
    let max = if max > 0.0 { max } else { 1.0 };

    let grid = RGBAColor(0, 0, 0, 0.1);
    for k in 1..=RADAR_RINGS {
        let r = radius * k as f64 / RADAR_RINGS as f64;
        let mut ring: Vec<Pixel> = (0..spokes).map(|i| polar(center, r, angle(i))).collect();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        area.draw(&PathElement::new(ring, grid.stroke_width(1)))
            .context("Failed to draw radar grid")?;
        area.draw(&Text::new(
            format_value(max * k as f64 / RADAR_RINGS as f64),
            polar(center, r, -FRAC_PI_2),
            centered(10.0),
        ))
        .context("Failed to draw radar tick")?;
    }
    for i in 0..spokes {
        area.draw(&PathElement::new(
            vec![polar(center, 0.0, 0.0), polar(center, radius, angle(i))],
            grid.stroke_width(1),
        ))
        .context("Failed to draw radar spoke")?;
        if let Some(label) = panel.labels.get(i) {
            area.draw(&Text::new(
                label.clone(),
                polar(center, radius + 18.0, angle(i)),
                centered(12.0),
            ))
            .context("Failed to draw radar label")?;
        }
    }

    for s in series {
        let vertices: Vec<Pixel> = s
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| polar(center, (p.y / max).clamp(0.0, 1.0) * radius, angle(i)))
            .collect();

        area.draw(&Polygon::new(vertices.clone(), s.fill_at(0).filled()))
            .context("Failed to draw radar area")?;
        let mut outline = vertices.clone();
        if let Some(first) = outline.first().copied() {
            outline.push(first);
        }
        area.draw(&PathElement::new(
            outline,
            s.border_at(0).stroke_width(s.stroke().max(1)),
        ))
        .context("Failed to draw radar outline")?;

        let point_radius = s.point_radius.max(0.0).round() as i32;
        for (i, vertex) in vertices.iter().enumerate() {
            if point_radius > 0 {
                area.draw(&Circle::new(*vertex, point_radius, s.border_at(0).filled()))
                    .context("Failed to draw radar point")?;
            }
            if panel.data_labels {
                if let Some(p) = s.points.get(i) {
                    let at = (vertex.0, vertex.1 - 10);
                    area.draw(&Text::new(format_value(p.y), at, centered(11.0)))
                        .context("Failed to draw data label")?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_segments_split_by_magnitude() {
        let spans = segment_angles(&[1.0, 1.0, 2.0], false);
        assert_eq!(spans.len(), 3);
        assert!((spans[0].0 + FRAC_PI_2).abs() < 1e-9);
        assert!((spans[2].1 - spans[2].0 - PI).abs() < 1e-9);
        assert!((spans[2].1 - (TAU - FRAC_PI_2)).abs() < 1e-9);
    }

    #[test]
    fn test_negative_values_use_magnitude() {
        let spans = segment_angles(&[-1.0, 1.0], false);
        assert!((spans[0].1 - spans[0].0 - PI).abs() < 1e-9);
    }

    #[test]
    fn test_all_zero_values_have_no_sweep() {
        let spans = segment_angles(&[0.0, 0.0], false);
        assert!(spans.iter().all(|(a, b)| a == b));
    }

    #[test]
    fn test_polar_area_splits_evenly() {
        let spans = segment_angles(&[5.0, 50.0, 500.0, 1.0], true);
        for (a, b) in spans {
            assert!((b - a - FRAC_PI_2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sector_closes_on_center_without_cutout() {
        let outline = sector((50.0, 50.0), 0.0, 40.0, -FRAC_PI_2, 0.0);
        assert_eq!(outline.first(), Some(&(50, 10)));
        assert_eq!(outline.last(), Some(&(50, 50)));
    }

    #[test]
    fn test_sector_with_cutout_returns_along_inner_arc() {
        let outline = sector((50.0, 50.0), 20.0, 40.0, -FRAC_PI_2, 0.0);
        assert_eq!(outline.first(), Some(&(50, 10)));
        assert_eq!(outline.last(), Some(&(50, 30)));
    }
}
