// Top-level structural checks for Vega-Lite specs. Nested specs are left to the compiler.

use super::{has_composition, VegaChartInput};
use crate::error::VegaValidationError;
use crate::validation::dimension_message;
use serde_json::Value;

const RAW_VEGA_SCHEMA: &str = "vega.github.io/schema/vega/";
const VEGA_LITE_MARKER: &str = "vega-lite";

/// Whether a `$schema` URI points at the low-level Vega grammar rather than Vega-Lite.
pub fn is_raw_vega_schema(schema: &str) -> bool {
    schema.contains(RAW_VEGA_SCHEMA) && !schema.contains(VEGA_LITE_MARKER)
}

/// Validate a Vega-Lite request, stopping at the first violation.
pub fn validate_vega_input(input: &VegaChartInput) -> Result<(), VegaValidationError> {
    let spec = match input.spec.as_object() {
        Some(spec) => spec,
        None => {
            return Err(VegaValidationError::new(
                "spec must be a JSON object containing a Vega-Lite specification.",
            ))
        }
    };

    if let Some(Value::String(schema)) = spec.get("$schema") {
        if is_raw_vega_schema(schema) {
            return Err(VegaValidationError::new(
                "This appears to be a raw Vega spec, not Vega-Lite. The create_vega_chart tool expects a Vega-Lite specification.",
            ));
        }
    }

    let has_mark = spec.contains_key("mark");
    let composite = has_composition(spec);

    if !has_mark && !composite {
        return Err(VegaValidationError::new(
            "Vega-Lite spec must contain a 'mark' field (for unit specs) or a composition operator ('layer', 'hconcat', 'vconcat', 'concat', 'facet', or 'repeat').",
        ));
    }

    if has_mark && !composite && !spec.contains_key("encoding") {
        return Err(VegaValidationError::new(
            "Unit spec has a 'mark' but no 'encoding'. Most Vega-Lite charts require an 'encoding' to map data fields to visual channels.",
        ));
    }

    if let Some(Value::Object(data)) = spec.get("data") {
        if matches!(data.get("values"), Some(values) if !values.is_array()) {
            return Err(VegaValidationError::new(
                "data.values must be an array of data objects.",
            ));
        }
    }

    let width = input.width.or_else(|| spec.get("width").and_then(Value::as_f64));
    let height = input.height.or_else(|| spec.get("height").and_then(Value::as_f64));

    for (axis, value) in [("Width", width), ("Height", height)] {
        if let Some(message) = value.and_then(|v| dimension_message(axis, v)) {
            return Err(VegaValidationError::new(message));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit_spec() -> Value {
        json!({
            "mark": "bar",
            "data": {"values": [{"a": "A", "b": 28}]},
            "encoding": {
                "x": {"field": "a", "type": "nominal"},
                "y": {"field": "b", "type": "quantitative"}
            }
        })
    }

    fn message(input: &VegaChartInput) -> String {
        validate_vega_input(input).unwrap_err().message
    }

    #[test]
    fn test_schema_predicate() {
        assert!(is_raw_vega_schema("https://vega.github.io/schema/vega/v5.json"));
        assert!(!is_raw_vega_schema(
            "https://vega.github.io/schema/vega-lite/v5.json"
        ));
        assert!(!is_raw_vega_schema("https://example.com/schema.json"));
        // Both markers present: treated as Vega-Lite.
        assert!(!is_raw_vega_schema(
            "https://vega.github.io/schema/vega/vega-lite-compat.json"
        ));
    }

    #[test]
    fn test_valid_unit_spec() {
        assert!(validate_vega_input(&VegaChartInput::new(unit_spec())).is_ok());
    }

    #[test]
    fn test_spec_must_be_object() {
        for spec in [json!(null), json!([1, 2]), json!("bar"), json!(3)] {
            assert_eq!(
                message(&VegaChartInput::new(spec)),
                "spec must be a JSON object containing a Vega-Lite specification."
            );
        }
    }

    #[test]
    fn test_raw_vega_rejected_even_if_well_formed() {
        let mut spec = unit_spec();
        spec["$schema"] = json!("https://vega.github.io/schema/vega/v5.json");
        assert!(message(&VegaChartInput::new(spec)).starts_with("This appears to be a raw Vega spec"));
    }

    #[test]
    fn test_vega_lite_schema_accepted() {
        let mut spec = unit_spec();
        spec["$schema"] = json!("https://vega.github.io/schema/vega-lite/v5.json");
        assert!(validate_vega_input(&VegaChartInput::new(spec)).is_ok());
    }

    #[test]
    fn test_needs_mark_or_composition() {
        let msg = message(&VegaChartInput::new(json!({"notAValidSpec": true})));
        assert!(msg.contains("must contain a 'mark' field"));
    }

    #[test]
    fn test_composition_without_mark_is_accepted() {
        for op in ["layer", "hconcat", "vconcat", "concat", "facet", "repeat"] {
            let mut spec = serde_json::Map::new();
            spec.insert(op.to_string(), json!([]));
            let input = VegaChartInput::new(Value::Object(spec));
            assert!(validate_vega_input(&input).is_ok(), "{}", op);
        }
    }

    #[test]
    fn test_unit_spec_needs_encoding() {
        let msg = message(&VegaChartInput::new(json!({"mark": "point"})));
        assert!(msg.starts_with("Unit spec has a 'mark' but no 'encoding'."));

        // A mark next to a composition operator is not a unit spec.
        let spec = json!({"mark": "point", "layer": []});
        assert!(validate_vega_input(&VegaChartInput::new(spec)).is_ok());
    }

    #[test]
    fn test_children_are_not_validated() {
        let spec = json!({"hconcat": [{"mark": "bar"}, {"nonsense": 1}]});
        assert!(validate_vega_input(&VegaChartInput::new(spec)).is_ok());
    }

    #[test]
    fn test_data_values_must_be_array() {
        let mut spec = unit_spec();
        spec["data"] = json!({"values": {"a": 1}});
        assert_eq!(
            message(&VegaChartInput::new(spec)),
            "data.values must be an array of data objects."
        );

        let mut spec = unit_spec();
        spec["data"] = json!({"url": "data/cars.json"});
        assert!(validate_vega_input(&VegaChartInput::new(spec)).is_ok());
    }

    #[test]
    fn test_dimension_bounds_from_spec() {
        let mut spec = unit_spec();
        spec["width"] = json!(4097);
        assert_eq!(
            message(&VegaChartInput::new(spec)),
            "Width must be between 50 and 4096 pixels, got 4097."
        );

        let mut spec = unit_spec();
        spec["height"] = json!(49);
        assert_eq!(
            message(&VegaChartInput::new(spec)),
            "Height must be between 50 and 4096 pixels, got 49."
        );
    }

    #[test]
    fn test_override_takes_precedence() {
        let mut spec = unit_spec();
        spec["width"] = json!(10);
        let mut input = VegaChartInput::new(spec);
        input.width = Some(50.0);
        assert!(validate_vega_input(&input).is_ok());

        let mut input = VegaChartInput::new(unit_spec());
        input.height = Some(4097.0);
        assert!(message(&input).starts_with("Height must be between"));
    }

    #[test]
    fn test_non_numeric_width_is_ignored() {
        let mut spec = unit_spec();
        spec["width"] = json!("container");
        assert!(validate_vega_input(&VegaChartInput::new(spec)).is_ok());
    }

    #[test]
    fn test_bounds_inclusive() {
        let mut input = VegaChartInput::new(unit_spec());
        input.width = Some(50.0);
        input.height = Some(4096.0);
        assert!(validate_vega_input(&input).is_ok());
    }
}
