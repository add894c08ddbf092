// Default colors for datasets the caller left uncolored

use crate::chart::{ChartFamily, ColorValue, Dataset};

/// Fill colors, in assignment order.
pub const FILL_COLORS: [&str; 10] = [
    "rgba(54, 162, 235, 0.8)",  // Blue
    "rgba(255, 99, 132, 0.8)",  // Red
    "rgba(75, 192, 192, 0.8)",  // Teal
    "rgba(255, 206, 86, 0.8)",  // Yellow
    "rgba(153, 102, 255, 0.8)", // Purple
    "rgba(255, 159, 64, 0.8)",  // Orange
    "rgba(201, 203, 207, 0.8)", // Gray
    "rgba(0, 204, 150, 0.8)",   // Emerald
    "rgba(255, 87, 51, 0.8)",   // Coral
    "rgba(100, 149, 237, 0.8)", // Cornflower
];

/// Border colors matching `FILL_COLORS` entry for entry.
pub const BORDER_COLORS: [&str; 10] = [
    "rgba(54, 162, 235, 1)",
    "rgba(255, 99, 132, 1)",
    "rgba(75, 192, 192, 1)",
    "rgba(255, 206, 86, 1)",
    "rgba(153, 102, 255, 1)",
    "rgba(255, 159, 64, 1)",
    "rgba(201, 203, 207, 1)",
    "rgba(0, 204, 150, 1)",
    "rgba(255, 87, 51, 1)",
    "rgba(100, 149, 237, 1)",
];

/// Vega's `tableau10` category scheme, used for Vega-Lite color encodings.
pub const CATEGORY_COLORS: [&str; 10] = [
    "#4c78a8", "#f58518", "#e45756", "#72b7b2", "#54a24b", "#eeca3b", "#b279a2", "#ff9da6",
    "#9d755d", "#bab0ac",
];

const SEGMENTED_BORDER_WIDTH: f64 = 1.0;
const SERIES_BORDER_WIDTH: f64 = 2.0;

/// Returns copies of `datasets` with unset colors filled in from the palette.
///
/// Segmented families (pie, doughnut, polar area) get one color per data point, taken
/// from the start of the palette without wrapping; the whole assignment is skipped when
/// `backgroundColor` is already set. Other families get one color per dataset, cycling
/// through the palette by dataset index, with each color field defaulted on its own.
pub fn apply_color_palette(datasets: &[Dataset], family: ChartFamily) -> Vec<Dataset> {
    let segmented = family.is_segmented();

    datasets
        .iter()
        .enumerate()
        .map(|(index, dataset)| {
            let mut result = dataset.clone();
            let color_index = index % FILL_COLORS.len();

            if segmented {
                if !is_set(&result.background_color) {
                    let n = result.data.len().min(FILL_COLORS.len());
                    result.background_color = Some(palette_slice(&FILL_COLORS, n));
                    result.border_color = Some(palette_slice(&BORDER_COLORS, n));
                    result.border_width = result.border_width.or(Some(SEGMENTED_BORDER_WIDTH));
                }
            } else {
                if !is_set(&result.background_color) {
                    result.background_color =
                        Some(ColorValue::Single(FILL_COLORS[color_index].to_string()));
                }
                if !is_set(&result.border_color) {
                    result.border_color =
                        Some(ColorValue::Single(BORDER_COLORS[color_index].to_string()));
                }
                result.border_width = result.border_width.or(Some(SERIES_BORDER_WIDTH));
            }

            result
        })
        .collect()
}

/// Category color for the `index`-th distinct value of a color encoding.
pub fn category_color(index: usize) -> &'static str {
    CATEGORY_COLORS[index % CATEGORY_COLORS.len()]
}

/// An empty string counts as unset.
fn is_set(color: &Option<ColorValue>) -> bool {
    match color {
        None => false,
        Some(ColorValue::Single(c)) => !c.is_empty(),
        Some(ColorValue::Many(_)) => true,
    }
}

fn palette_slice(palette: &[&str], n: usize) -> ColorValue {
    ColorValue::Many(palette[..n].iter().map(|c| c.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::DataPoint;

    fn series(n_datasets: usize) -> Vec<Dataset> {
        (0..n_datasets)
            .map(|_| Dataset::from_values(None, &[1.0, 2.0, 3.0]))
            .collect()
    }

    #[test]
    fn test_single_color_per_dataset() {
        let out = apply_color_palette(&series(2), ChartFamily::Bar);
        assert_eq!(
            out[0].background_color,
            Some(ColorValue::Single(FILL_COLORS[0].to_string()))
        );
        assert_eq!(
            out[1].border_color,
            Some(ColorValue::Single(BORDER_COLORS[1].to_string()))
        );
        assert_eq!(out[0].border_width, Some(2.0));
    }

    #[test]
    fn test_wraps_across_datasets() {
        let out = apply_color_palette(&series(13), ChartFamily::Line);
        for (i, ds) in out.iter().enumerate() {
            assert_eq!(
                ds.background_color,
                Some(ColorValue::Single(FILL_COLORS[i % 10].to_string()))
            );
        }
    }

    #[test]
    fn test_segmented_colors_per_point() {
        let out = apply_color_palette(&series(1), ChartFamily::Pie);
        let expected: Vec<String> = FILL_COLORS[..3].iter().map(|c| c.to_string()).collect();
        assert_eq!(out[0].background_color, Some(ColorValue::Many(expected)));
        let border: Vec<String> = BORDER_COLORS[..3].iter().map(|c| c.to_string()).collect();
        assert_eq!(out[0].border_color, Some(ColorValue::Many(border)));
        assert_eq!(out[0].border_width, Some(1.0));
    }

    #[test]
    fn test_segmented_does_not_wrap_within_dataset() {
        let values: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let input = vec![Dataset::from_values(None, &values)];
        let out = apply_color_palette(&input, ChartFamily::Doughnut);
        match &out[0].background_color {
            Some(ColorValue::Many(colors)) => assert_eq!(colors.len(), 10),
            other => panic!("expected per-point colors, got {:?}", other),
        }
    }

    #[test]
    fn test_preset_background_is_untouched() {
        let mut ds = Dataset::from_values(Some("Preset"), &[5.0, 6.0]);
        ds.background_color = Some(ColorValue::Single("#123456".to_string()));
        ds.border_color = Some(ColorValue::Single("#654321".to_string()));

        for family in ChartFamily::ALL {
            let out = apply_color_palette(std::slice::from_ref(&ds), family);
            assert_eq!(out[0].background_color, ds.background_color);
            assert_eq!(out[0].border_color, ds.border_color);
        }
    }

    #[test]
    fn test_segmented_skips_border_when_background_preset() {
        let mut ds = Dataset::from_values(None, &[1.0, 2.0]);
        ds.background_color = Some(ColorValue::Many(vec!["red".into(), "blue".into()]));
        let out = apply_color_palette(&[ds], ChartFamily::PolarArea);
        assert_eq!(out[0].border_color, None);
        assert_eq!(out[0].border_width, None);
    }

    #[test]
    fn test_partial_override_defaults_other_field() {
        let mut ds = Dataset::from_values(None, &[1.0]);
        ds.border_color = Some(ColorValue::Single("black".to_string()));
        ds.border_width = Some(4.0);
        let out = apply_color_palette(&[ds], ChartFamily::Bar);
        assert_eq!(
            out[0].background_color,
            Some(ColorValue::Single(FILL_COLORS[0].to_string()))
        );
        assert_eq!(out[0].border_color, Some(ColorValue::Single("black".to_string())));
        assert_eq!(out[0].border_width, Some(4.0));
    }

    #[test]
    fn test_input_is_not_mutated() {
        let input = vec![Dataset::new(None, vec![DataPoint::xy(1.0, 2.0)])];
        let before = input.clone();
        let _ = apply_color_palette(&input, ChartFamily::Scatter);
        assert_eq!(input, before);
    }
}
