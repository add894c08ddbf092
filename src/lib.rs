// Library exports for gramchart

pub mod chart;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod file_utils;
pub mod graph;
pub mod palette;
pub mod renderer;
pub mod server;
pub mod validation;
pub mod vega;

pub use error::{ChartError, ValidationError, VegaValidationError};

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Smallest accepted image dimension, in pixels.
pub const MIN_DIMENSION: f64 = 50.0;
/// Largest accepted image dimension, in pixels.
pub const MAX_DIMENSION: f64 = 4096.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    #[serde(rename = "png")]
    #[default]
    Png,
    #[serde(rename = "svg")]
    Svg,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Svg => "image/svg+xml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Svg => "svg",
        }
    }
}

/// Rendered image plus the metadata the tool result needs.
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub bytes: Vec<u8>,
    pub base64: String,
    pub mime_type: &'static str,
    pub extension: &'static str,
}

impl RenderResult {
    pub fn new(bytes: Vec<u8>, format: OutputFormat) -> Self {
        let base64 = general_purpose::STANDARD.encode(&bytes);
        Self {
            bytes,
            base64,
            mime_type: format.mime_type(),
            extension: format.extension(),
        }
    }
}

/// Image size and background used when a request leaves them out.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderOptions {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_background")]
    pub background: String,
}

fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_background() -> String { "white".to_string() }

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            background: default_background(),
        }
    }
}

impl RenderOptions {
    /// Defaults for Vega-Lite views, which size the plot area rather than the image.
    pub fn vega() -> Self {
        Self {
            width: 400,
            height: 300,
            background: default_background(),
        }
    }
}

/// Checks a requested dimension against `[MIN_DIMENSION, MAX_DIMENSION]`.
pub fn dimension_in_bounds(value: f64) -> bool {
    (MIN_DIMENSION..=MAX_DIMENSION).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_tags() {
        assert_eq!(OutputFormat::default(), OutputFormat::Png);
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
        assert_eq!(OutputFormat::Svg.mime_type(), "image/svg+xml");
        assert_eq!(OutputFormat::Svg.extension(), "svg");
    }

    #[test]
    fn test_render_result_encodes_base64() {
        let result = RenderResult::new(b"<svg/>".to_vec(), OutputFormat::Svg);
        assert_eq!(result.base64, "PHN2Zy8+");
        assert_eq!(result.mime_type, "image/svg+xml");
    }

    #[test]
    fn test_dimension_bounds() {
        assert!(dimension_in_bounds(50.0));
        assert!(dimension_in_bounds(4096.0));
        assert!(!dimension_in_bounds(49.0));
        assert!(!dimension_in_bounds(4097.0));
        assert!(!dimension_in_bounds(f64::NAN));
    }
}
