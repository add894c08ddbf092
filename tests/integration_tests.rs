use base64::{engine::general_purpose, Engine as _};
use gramchart::config::ServerConfig;
use gramchart::server::{ChartServer, Content, ToolResult};
use serde_json::{json, Value};
use tempfile::TempDir;

/// Server writing into a temporary directory, never opening a viewer
fn test_server(dir: &TempDir) -> ChartServer {
    ChartServer::new(ServerConfig {
        output_dir: Some(dir.path().to_path_buf()),
        auto_open: false,
    })
}

/// Check if bytes are a valid PNG
fn is_valid_png(bytes: &[u8]) -> bool {
    bytes.len() > 8 && bytes[0..8] == [137, 80, 78, 71, 13, 10, 26, 10]
}

fn image_of(result: &ToolResult) -> (Vec<u8>, String) {
    match &result.content[0] {
        Content::Image { data, mime_type } => (
            general_purpose::STANDARD.decode(data).expect("image data is base64"),
            mime_type.clone(),
        ),
        other => panic!("expected an image, got {:?}", other),
    }
}

fn text_of(result: &ToolResult) -> String {
    result
        .content
        .iter()
        .find_map(|c| match c {
            Content::Text { text } => Some(text.clone()),
            _ => None,
        })
        .expect("result has a text item")
}

fn saved_path(result: &ToolResult) -> std::path::PathBuf {
    let text = text_of(result);
    let path = text
        .strip_prefix("Chart saved to: ")
        .unwrap_or_else(|| panic!("unexpected text: {}", text));
    std::path::PathBuf::from(path)
}

async fn create_chart(args: Value) -> (ToolResult, TempDir) {
    let dir = TempDir::new().unwrap();
    let result = test_server(&dir).create_chart(args).await;
    (result, dir)
}

async fn create_vega_chart(args: Value) -> (ToolResult, TempDir) {
    let dir = TempDir::new().unwrap();
    let result = test_server(&dir).create_vega_chart(args).await;
    (result, dir)
}

#[tokio::test]
async fn test_end_to_end_bar_chart_png() {
    let (result, _dir) = create_chart(json!({
        "type": "bar",
        "labels": ["A", "B", "C"],
        "datasets": [{"label": "Test", "data": [10, 20, 30]}]
    }))
    .await;

    assert!(!result.is_error, "Failed: {}", text_of(&result));
    let (bytes, mime) = image_of(&result);
    assert!(is_valid_png(&bytes), "Output is not a valid PNG");
    assert_eq!(mime, "image/png");
    assert!(text_of(&result).contains("Chart saved to:"));

    let path = saved_path(&result);
    assert_eq!(std::fs::read(&path).unwrap(), bytes);
    assert!(path.file_name().unwrap().to_str().unwrap().starts_with("bar-"));
}

#[tokio::test]
async fn test_end_to_end_bubble_without_radius() {
    let (result, dir) = create_chart(json!({
        "type": "bubble",
        "datasets": [{"data": [{"x": 1, "y": 2}]}]
    }))
    .await;

    assert!(result.is_error);
    assert_eq!(result.content.len(), 1);
    let text = text_of(&result);
    assert!(text.starts_with("Error creating chart: "));
    assert!(text.contains("bubble charts require"));
    // Nothing is saved when validation fails.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_end_to_end_invalid_vega_spec() {
    let (result, _dir) = create_vega_chart(json!({"spec": {"notAValidSpec": true}})).await;
    assert!(result.is_error);
    assert!(text_of(&result).contains("Error creating Vega-Lite chart"));
}

#[tokio::test]
async fn test_end_to_end_pie_chart_svg() {
    let (result, _dir) = create_chart(json!({
        "type": "pie",
        "labels": ["X", "Y"],
        "datasets": [{"data": [60, 40]}],
        "outputFormat": "svg"
    }))
    .await;

    assert!(!result.is_error, "Failed: {}", text_of(&result));
    let (bytes, mime) = image_of(&result);
    assert!(String::from_utf8_lossy(&bytes).contains("<svg"));
    assert_eq!(mime, "image/svg+xml");
    assert_eq!(saved_path(&result).extension().unwrap(), "svg");
}

#[tokio::test]
async fn test_end_to_end_every_chart_type() {
    let labelled = |t: &str| {
        json!({
            "type": t,
            "labels": ["a", "b", "c"],
            "datasets": [
                {"label": "one", "data": [3, 5, 2]},
                {"label": "two", "data": [1, 4, 6]}
            ],
            "options": {"title": format!("{} chart", t), "showDataLabels": true}
        })
    };
    let mut requests: Vec<Value> = ["bar", "line", "area", "radar", "histogram", "pie", "doughnut", "polarArea"]
        .iter()
        .map(|t| labelled(t))
        .collect();
    requests.push(json!({
        "type": "scatter",
        "datasets": [{"label": "pts", "data": [{"x": 1, "y": 2}, {"x": 3, "y": 1}]}]
    }));
    requests.push(json!({
        "type": "bubble",
        "datasets": [{"label": "b", "data": [{"x": 1, "y": 2, "r": 5}, {"x": 2, "y": 3, "r": 9}]}]
    }));

    for request in requests {
        let chart_type = request["type"].clone();
        let (result, _dir) = create_chart(request).await;
        assert!(!result.is_error, "{}: {}", chart_type, text_of(&result));
        assert!(is_valid_png(&image_of(&result).0), "{} is not a PNG", chart_type);
    }
}

#[tokio::test]
async fn test_end_to_end_label_mismatch() {
    let (result, _dir) = create_chart(json!({
        "type": "line",
        "labels": ["a", "b"],
        "datasets": [{"label": "Sales", "data": [1, 2, 3]}]
    }))
    .await;
    assert_eq!(
        text_of(&result),
        "Error creating chart: Dataset \"Sales\" has 3 data points but 2 labels were provided. These counts should match."
    );
}

#[tokio::test]
async fn test_end_to_end_dimension_bounds() {
    let (result, _dir) = create_chart(json!({
        "type": "bar",
        "datasets": [{"data": [1]}],
        "options": {"width": 4097}
    }))
    .await;
    assert!(text_of(&result).contains("Width must be between 50 and 4096 pixels, got 4097."));
}

#[tokio::test]
async fn test_end_to_end_vega_bar_chart() {
    let (result, _dir) = create_vega_chart(json!({
        "spec": {
            "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
            "title": "Sales",
            "data": {"values": [
                {"category": "A", "amount": 28},
                {"category": "B", "amount": 55},
                {"category": "C", "amount": 43}
            ]},
            "mark": "bar",
            "encoding": {
                "x": {"field": "category", "type": "nominal"},
                "y": {"field": "amount", "type": "quantitative"}
            }
        }
    }))
    .await;

    assert!(!result.is_error, "Failed: {}", text_of(&result));
    assert!(is_valid_png(&image_of(&result).0));
    let name = saved_path(&result);
    assert!(name.file_name().unwrap().to_str().unwrap().starts_with("vega-"));
}

#[tokio::test]
async fn test_end_to_end_vega_composition_svg() {
    let bars = json!({
        "mark": "bar",
        "encoding": {
            "x": {"field": "k", "type": "nominal"},
            "y": {"field": "v", "type": "quantitative"}
        }
    });
    let line = json!({
        "mark": {"type": "line", "point": true},
        "encoding": {
            "x": {"field": "k", "type": "ordinal"},
            "y": {"field": "v", "type": "quantitative", "aggregate": "mean"}
        }
    });
    let (result, _dir) = create_vega_chart(json!({
        "spec": {
            "data": {"values": [{"k": "a", "v": 1}, {"k": "b", "v": 3}, {"k": "a", "v": 5}]},
            "hconcat": [bars, {"layer": [line]}]
        },
        "outputFormat": "svg",
        "background": "#fafafa"
    }))
    .await;

    assert!(!result.is_error, "Failed: {}", text_of(&result));
    let (bytes, mime) = image_of(&result);
    assert_eq!(mime, "image/svg+xml");
    assert!(String::from_utf8_lossy(&bytes).contains("<svg"));
}

#[tokio::test]
async fn test_end_to_end_raw_vega_rejected() {
    let (result, _dir) = create_vega_chart(json!({
        "spec": {
            "$schema": "https://vega.github.io/schema/vega/v5.json",
            "marks": []
        }
    }))
    .await;
    assert!(text_of(&result).contains("This appears to be a raw Vega spec"));
}

#[tokio::test]
async fn test_end_to_end_vega_compilation_error() {
    let (result, _dir) = create_vega_chart(json!({
        "spec": {
            "data": {"values": [{"a": 1}]},
            "mark": "bar",
            "encoding": {"x": {"field": "a", "type": "numeric"}}
        }
    }))
    .await;
    assert!(result.is_error);
    assert!(text_of(&result).starts_with(
        "Error creating Vega-Lite chart: Vega-Lite compilation failed: "
    ));
}

#[tokio::test]
async fn test_end_to_end_vega_size_override_bounds() {
    let (result, _dir) = create_vega_chart(json!({
        "spec": {
            "mark": "point",
            "data": {"values": [{"a": 1, "b": 2}]},
            "encoding": {"x": {"field": "a", "type": "quantitative"}, "y": {"field": "b", "type": "quantitative"}}
        },
        "height": 49
    }))
    .await;
    assert!(text_of(&result).contains("Height must be between 50 and 4096 pixels, got 49."));
}
