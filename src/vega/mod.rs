//! Vega-Lite dialect: request model, structural validation, compilation to the canvas
//! engine's figure model, and the render entry point.

pub mod compiler;
pub mod renderer;
pub mod validation;

pub use compiler::compile;
pub use renderer::render_vega_chart;
pub use validation::{is_raw_vega_schema, validate_vega_input};

use crate::OutputFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys whose presence makes a spec composite rather than a unit spec.
pub const COMPOSITION_OPERATORS: [&str; 6] =
    ["layer", "hconcat", "vconcat", "concat", "facet", "repeat"];

/// Arguments of the `create_vega_chart` tool. Overrides beat values in the spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VegaChartInput {
    pub spec: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_open: Option<bool>,
}

impl VegaChartInput {
    pub fn new(spec: Value) -> Self {
        Self {
            spec,
            width: None,
            height: None,
            background: None,
            output_format: None,
            output_path: None,
            auto_open: None,
        }
    }
}

/// True when `spec` carries at least one composition operator.
pub fn has_composition(spec: &serde_json::Map<String, Value>) -> bool {
    COMPOSITION_OPERATORS.iter().any(|op| spec.contains_key(*op))
}
