// Structural checks for simple chart descriptions, run before any rendering

use crate::chart::{ChartDescription, ChartFamily, Dataset};
use crate::error::ValidationError;
use crate::dimension_in_bounds;

/// Validate a chart description, stopping at the first violation.
///
/// Order: dataset presence, then per dataset (empty data, bubble/scatter point shape,
/// label count), then width and height bounds.
pub fn validate_chart_input(input: &ChartDescription) -> Result<(), ValidationError> {
    if input.datasets.is_empty() {
        return Err(ValidationError::new("At least one dataset is required."));
    }

    for (i, ds) in input.datasets.iter().enumerate() {
        let name = dataset_name(ds, i);

        if ds.data.is_empty() {
            return Err(ValidationError::new(format!(
                "Dataset {} has no data points.",
                name
            )));
        }

        if input.chart_type == ChartFamily::Bubble {
            if let Some(j) = ds.data.iter().position(|p| !p.has_xyr()) {
                return Err(ValidationError::new(format!(
                    "Dataset {}, point {}: bubble charts require data points with {{x, y, r}} properties.",
                    name,
                    j + 1
                )));
            }
        }

        if input.chart_type == ChartFamily::Scatter {
            if let Some(j) = ds.data.iter().position(|p| !p.has_xy()) {
                return Err(ValidationError::new(format!(
                    "Dataset {}, point {}: scatter charts require data points with {{x, y}} properties.",
                    name,
                    j + 1
                )));
            }
        }

        if let Some(labels) = &input.labels {
            let family = input.chart_type;
            if family.is_label_keyed()
                && !family.is_coordinate_pair()
                && labels.len() != ds.data.len()
            {
                return Err(ValidationError::new(format!(
                    "Dataset {} has {} data points but {} labels were provided. These counts should match.",
                    name,
                    ds.data.len(),
                    labels.len()
                )));
            }
        }
    }

    let options = input.options.as_ref();
    check_dimension("Width", options.and_then(|o| o.width))?;
    check_dimension("Height", options.and_then(|o| o.height))?;

    Ok(())
}

/// Bound check shared by both dialects.
pub(crate) fn dimension_message(axis: &str, value: f64) -> Option<String> {
    if dimension_in_bounds(value) {
        None
    } else {
        Some(format!(
            "{} must be between 50 and 4096 pixels, got {}.",
            axis, value
        ))
    }
}

fn check_dimension(axis: &str, value: Option<f64>) -> Result<(), ValidationError> {
    match value.and_then(|v| dimension_message(axis, v)) {
        Some(message) => Err(ValidationError::new(message)),
        None => Ok(()),
    }
}

/// `"label"` when the dataset is labelled, otherwise `#n` (1-based).
fn dataset_name(ds: &Dataset, index: usize) -> String {
    match ds.label.as_deref() {
        Some(label) if !label.is_empty() => format!("\"{}\"", label),
        _ => format!("#{}", index + 1),
    }
}
