// Render entry point for Vega-Lite specs

use super::{compile, validate_vega_input, VegaChartInput};
use crate::error::Result;
use crate::renderer::render_figure;
use crate::{RenderOptions, RenderResult};
use serde_json::{json, Value};
use tracing::debug;

/// Validate, compile and render a Vega-Lite spec.
///
/// `width`, `height` and `background` on the input win over the same keys in the spec.
/// Missing values fall back to a 400x300 view on white.
pub async fn render_vega_chart(input: &VegaChartInput) -> Result<RenderResult> {
    validate_vega_input(input)?;

    let spec = apply_overrides(input);
    let figure = compile(&spec, &RenderOptions::vega())?;
    let format = input.output_format.unwrap_or_default();
    debug!(
        panels = figure.panels.len(),
        width = figure.width,
        height = figure.height,
        "rendering vega-lite chart"
    );

    render_figure(figure, format).await
}

/// Copy of the spec with the input's size and background written into it.
fn apply_overrides(input: &VegaChartInput) -> Value {
    let mut spec = input.spec.clone();
    if let Some(obj) = spec.as_object_mut() {
        if let Some(width) = input.width {
            obj.insert("width".to_string(), json!(width));
        }
        if let Some(height) = input.height {
            obj.insert("height".to_string(), json!(height));
        }
        if let Some(background) = &input.background {
            obj.insert("background".to_string(), json!(background));
        }
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChartError;
    use crate::OutputFormat;

    fn bar_input() -> VegaChartInput {
        VegaChartInput::new(json!({
            "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
            "mark": "bar",
            "data": {"values": [{"a": "A", "b": 28}, {"a": "B", "b": 55}]},
            "encoding": {
                "x": {"field": "a", "type": "nominal"},
                "y": {"field": "b", "type": "quantitative"}
            }
        }))
    }

    #[test]
    fn test_overrides_beat_spec_values() {
        let mut input = bar_input();
        input.spec["width"] = json!(100);
        input.width = Some(250.0);
        input.background = Some("#000000".to_string());
        let spec = apply_overrides(&input);
        assert_eq!(spec["width"], json!(250.0));
        assert_eq!(spec["background"], json!("#000000"));
        assert!(spec.get("height").is_none());
        // The caller's spec is untouched.
        assert_eq!(input.spec["width"], json!(100));
    }

    #[tokio::test]
    async fn test_renders_png() {
        let result = render_vega_chart(&bar_input()).await.unwrap();
        assert_eq!(result.mime_type, "image/png");
        assert_eq!(&result.bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn test_renders_svg() {
        let mut input = bar_input();
        input.output_format = Some(OutputFormat::Svg);
        let result = render_vega_chart(&input).await.unwrap();
        let svg = String::from_utf8(result.bytes).unwrap();
        assert!(svg.contains("<svg"));
        assert_eq!(result.extension, "svg");
    }

    #[tokio::test]
    async fn test_validation_runs_before_compilation() {
        let mut input = bar_input();
        input.spec.as_object_mut().unwrap().remove("mark");
        let err = render_vega_chart(&input).await.unwrap_err();
        assert!(matches!(err, ChartError::VegaValidation(_)));
    }

    #[tokio::test]
    async fn test_compilation_errors_are_reported() {
        let mut input = bar_input();
        input.spec["data"] = json!({"url": "data/cars.json"});
        let err = render_vega_chart(&input).await.unwrap_err();
        assert!(matches!(err, ChartError::Compilation(_)));
        assert!(err.to_string().contains("data.url"));
    }
}
