//! MCP tool server over stdio: newline-delimited JSON-RPC 2.0 on stdin/stdout.
//!
//! Two tools are exposed, `create_chart` and `create_vega_chart`. Every tool failure is
//! returned as a result with `isError: true`; JSON-RPC errors are reserved for protocol
//! problems (bad JSON, unknown method or tool).

use crate::chart::ChartDescription;
use crate::config::ServerConfig;
use crate::error::{ChartError, Result};
use crate::file_utils::{default_output_path, open_chart, save_chart};
use crate::renderer::render_chart;
use crate::vega::{render_vega_chart, VegaChartInput};
use crate::RenderResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "gramchart";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

/// One item of a tool result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Text {
        text: String,
    },
}

/// Result of a `tools/call`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    fn image(result: &RenderResult, path: &std::path::Path) -> Self {
        Self {
            content: vec![
                Content::Image {
                    data: result.base64.clone(),
                    mime_type: result.mime_type.to_string(),
                },
                Content::Text {
                    text: format!("Chart saved to: {}", path.display()),
                },
            ],
            is_error: false,
        }
    }

    fn error(text: String) -> Self {
        Self {
            content: vec![Content::Text { text }],
            is_error: true,
        }
    }
}

fn success(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn failure(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message.into()}})
}

// =============================================================================
// Server
// =============================================================================

pub struct ChartServer {
    config: ServerConfig,
}

impl ChartServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Handle one line of input. Returns the response to write, if any.
    pub async fn handle_line(&self, line: &str) -> Option<Value> {
        let message: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => return Some(failure(Value::Null, PARSE_ERROR, format!("Parse error: {}", e))),
        };
        let request: Request = match serde_json::from_value(message.clone()) {
            Ok(r) => r,
            Err(e) => {
                let id = message.get("id").cloned().unwrap_or(Value::Null);
                return Some(failure(id, INVALID_REQUEST, format!("Invalid request: {}", e)));
            }
        };

        // Requests without an id are notifications and get no reply.
        let Some(id) = request.id else {
            debug!(method = %request.method, "notification");
            return None;
        };
        Some(self.dispatch(id, &request.method, request.params).await)
    }

    async fn dispatch(&self, id: Value, method: &str, params: Option<Value>) -> Value {
        debug!(method, "request");
        match method {
            "initialize" => success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")}
                }),
            ),
            "ping" => success(id, json!({})),
            "tools/list" => success(id, json!({"tools": tool_definitions()})),
            "tools/call" => {
                let params: CallParams = match params.map(serde_json::from_value).transpose() {
                    Ok(Some(p)) => p,
                    Ok(None) => return failure(id, INVALID_PARAMS, "tools/call needs params"),
                    Err(e) => return failure(id, INVALID_PARAMS, format!("Invalid params: {}", e)),
                };
                let arguments = params.arguments.unwrap_or_else(|| json!({}));
                match self.call_tool(&params.name, arguments).await {
                    Some(result) => match serde_json::to_value(result) {
                        Ok(v) => success(id, v),
                        Err(e) => failure(id, INVALID_PARAMS, e.to_string()),
                    },
                    None => failure(id, INVALID_PARAMS, format!("Unknown tool: {}", params.name)),
                }
            }
            other => failure(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        }
    }

    /// Run a tool by name. `None` when no such tool exists.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Option<ToolResult> {
        match name {
            "create_chart" => Some(self.create_chart(arguments).await),
            "create_vega_chart" => Some(self.create_vega_chart(arguments).await),
            _ => None,
        }
    }

    pub async fn create_chart(&self, arguments: Value) -> ToolResult {
        let outcome = async {
            let input: ChartDescription = serde_json::from_value(arguments)?;
            let result = render_chart(&input).await?;
            let path = self
                .deliver(&result, input.chart_type.as_str(), input.output_path.as_deref(), input.auto_open)
                .await?;
            Ok::<_, ChartError>((result, path))
        }
        .await;
        self.respond(outcome, "Error creating chart")
    }

    pub async fn create_vega_chart(&self, arguments: Value) -> ToolResult {
        let outcome = async {
            let input: VegaChartInput = serde_json::from_value(arguments)?;
            let result = render_vega_chart(&input).await?;
            let path = self
                .deliver(&result, "vega", input.output_path.as_deref(), input.auto_open)
                .await?;
            Ok::<_, ChartError>((result, path))
        }
        .await;
        self.respond(outcome, "Error creating Vega-Lite chart")
    }

    fn respond(&self, outcome: Result<(RenderResult, PathBuf)>, prefix: &str) -> ToolResult {
        match outcome {
            Ok((result, path)) => ToolResult::image(&result, &path),
            Err(e) => {
                warn!(category = e.category(), error = %e, "{}", prefix);
                ToolResult::error(format!("{}: {}", prefix, e))
            }
        }
    }

    /// Save the rendered chart and optionally open it.
    async fn deliver(
        &self,
        result: &RenderResult,
        chart_type: &str,
        output_path: Option<&str>,
        auto_open: Option<bool>,
    ) -> Result<PathBuf> {
        let path = match output_path.filter(|p| !p.trim().is_empty()) {
            Some(p) => PathBuf::from(p),
            None => default_output_path(self.config.output_dir.as_deref(), chart_type, result.extension)?,
        };
        save_chart(&result.bytes, &path).await?;
        if auto_open.unwrap_or(self.config.auto_open) {
            open_chart(&path).await;
        }
        Ok(path)
    }
}

/// Read requests from `reader` until EOF, writing one response line per request.
pub async fn serve<R, W>(server: &ChartServer, reader: R, mut writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = server.handle_line(&line).await {
            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }
    }
    Ok(())
}

/// Serve on the process's stdin and stdout.
pub async fn serve_stdio(config: ServerConfig) -> anyhow::Result<()> {
    info!(
        output_dir = ?config.output_dir,
        auto_open = config.auto_open,
        "gramchart server listening on stdio"
    );
    let server = ChartServer::new(config);
    serve(&server, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
    info!("stdin closed, shutting down");
    Ok(())
}

// =============================================================================
// Tool definitions
// =============================================================================

fn output_properties() -> Value {
    json!({
        "outputFormat": {
            "type": "string",
            "enum": ["png", "svg"],
            "description": "Image format (default png)"
        },
        "outputPath": {
            "type": "string",
            "description": "Where to save the chart (default ./charts/{type}-{timestamp}.{ext})"
        },
        "autoOpen": {
            "type": "boolean",
            "description": "Open the saved chart in the system viewer"
        }
    })
}

fn with_output(mut properties: Value) -> Value {
    if let (Some(props), Value::Object(extra)) = (properties.as_object_mut(), output_properties()) {
        props.extend(extra);
    }
    properties
}

/// `tools/list` entries with their JSON Schemas.
pub fn tool_definitions() -> Value {
    let color = json!({
        "oneOf": [
            {"type": "string"},
            {"type": "array", "items": {"type": "string"}}
        ]
    });
    let point = json!({
        "oneOf": [
            {"type": "number"},
            {
                "type": "object",
                "properties": {
                    "x": {"type": "number"},
                    "y": {"type": "number"},
                    "r": {"type": "number"}
                }
            }
        ]
    });

    let chart_properties = with_output(json!({
        "type": {
            "type": "string",
            "enum": ["bar", "line", "pie", "doughnut", "scatter", "area", "radar", "bubble", "polarArea", "histogram"],
            "description": "Chart type"
        },
        "labels": {
            "type": "array",
            "items": {"type": "string"},
            "description": "Category labels, one per data point"
        },
        "datasets": {
            "type": "array",
            "minItems": 1,
            "items": {
                "type": "object",
                "properties": {
                    "label": {"type": "string"},
                    "data": {"type": "array", "items": point},
                    "backgroundColor": color.clone(),
                    "borderColor": color,
                    "borderWidth": {"type": "number"},
                    "fill": {"type": "boolean"}
                },
                "required": ["data"]
            }
        },
        "options": {
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "subtitle": {"type": "string"},
                "showLegend": {"type": "boolean"},
                "width": {"type": "number", "minimum": 50, "maximum": 4096},
                "height": {"type": "number", "minimum": 50, "maximum": 4096},
                "backgroundColor": {"type": "string"},
                "xAxisLabel": {"type": "string"},
                "yAxisLabel": {"type": "string"},
                "stacked": {"type": "boolean"},
                "indexAxis": {"type": "string", "enum": ["x", "y"]},
                "yAxisType": {"type": "string", "enum": ["linear", "logarithmic"]},
                "beginAtZero": {"type": "boolean"},
                "tension": {"type": "number"},
                "showDataLabels": {"type": "boolean"}
            }
        }
    }));

    let vega_properties = with_output(json!({
        "spec": {
            "type": "object",
            "description": "Vega-Lite specification with inline data.values"
        },
        "width": {"type": "number", "minimum": 50, "maximum": 4096, "description": "View width override"},
        "height": {"type": "number", "minimum": 50, "maximum": 4096, "description": "View height override"},
        "background": {"type": "string", "description": "Background color override"}
    }));

    json!([
        {
            "name": "create_chart",
            "description": "Render a bar, line, area, pie, doughnut, polar area, radar, scatter, bubble or histogram chart to PNG or SVG.",
            "inputSchema": {
                "type": "object",
                "properties": chart_properties,
                "required": ["type", "datasets"]
            }
        },
        {
            "name": "create_vega_chart",
            "description": "Render a Vega-Lite specification to PNG or SVG.",
            "inputSchema": {
                "type": "object",
                "properties": vega_properties,
                "required": ["spec"]
            }
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose, Engine as _};
    use tempfile::TempDir;

    fn server(dir: &TempDir) -> ChartServer {
        ChartServer::new(ServerConfig {
            output_dir: Some(dir.path().to_path_buf()),
            auto_open: false,
        })
    }

    fn text_of(result: &ToolResult) -> &str {
        result
            .content
            .iter()
            .find_map(|c| match c {
                Content::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let tmp = TempDir::new().unwrap();
        let response = server(&tmp)
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        assert_eq!(response["id"], 1);
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], "gramchart");
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let tmp = TempDir::new().unwrap();
        let reply = server(&tmp)
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let tmp = TempDir::new().unwrap();
        let response = server(&tmp)
            .handle_line(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = response["result"]["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(names, vec!["create_chart", "create_vega_chart"]);
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["type", "datasets"]));
        assert!(tools[1]["inputSchema"]["properties"]["outputPath"].is_object());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let tmp = TempDir::new().unwrap();
        let s = server(&tmp);

        let parse = s.handle_line("{not json").await.unwrap();
        assert_eq!(parse["error"]["code"], PARSE_ERROR);
        assert_eq!(parse["id"], Value::Null);

        let method = s
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(method["error"]["code"], METHOD_NOT_FOUND);

        let tool = s
            .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"draw","arguments":{}}}"#)
            .await
            .unwrap();
        assert_eq!(tool["error"]["code"], INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_create_chart_saves_file() {
        let tmp = TempDir::new().unwrap();
        let result = server(&tmp)
            .create_chart(json!({
                "type": "line",
                "labels": ["a", "b"],
                "datasets": [{"label": "s", "data": [1, 2]}],
                "outputFormat": "svg"
            }))
            .await;
        assert!(!result.is_error);

        let Content::Image { data, mime_type } = &result.content[0] else {
            panic!("expected an image item");
        };
        assert_eq!(mime_type, "image/svg+xml");
        let svg = general_purpose::STANDARD.decode(data).unwrap();
        assert!(String::from_utf8_lossy(&svg).contains("<svg"));

        let text = text_of(&result);
        let path = text.strip_prefix("Chart saved to: ").unwrap();
        assert!(path.contains("line-"));
        assert!(std::path::Path::new(path).exists());
    }

    #[tokio::test]
    async fn test_explicit_output_path() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("nested").join("mine.png");
        let result = server(&tmp)
            .create_chart(json!({
                "type": "pie",
                "labels": ["x", "y"],
                "datasets": [{"data": [1, 2]}],
                "outputPath": target.to_str().unwrap(),
                "autoOpen": false
            }))
            .await;
        assert!(!result.is_error, "{}", text_of(&result));
        assert!(target.exists());
    }

    #[tokio::test]
    async fn test_tool_errors_are_results() {
        let tmp = TempDir::new().unwrap();
        let s = server(&tmp);

        let invalid = s.create_chart(json!({"type": "bar", "datasets": []})).await;
        assert!(invalid.is_error);
        assert_eq!(
            text_of(&invalid),
            "Error creating chart: At least one dataset is required."
        );

        let malformed = s.create_chart(json!({"type": "sparkline", "datasets": []})).await;
        assert!(text_of(&malformed).starts_with("Error creating chart: invalid arguments:"));

        let vega = s.create_vega_chart(json!({"spec": {"notAValidSpec": true}})).await;
        assert!(vega.is_error);
        assert!(text_of(&vega).starts_with("Error creating Vega-Lite chart: "));
    }

    #[tokio::test]
    async fn test_tool_call_result_shape() {
        let tmp = TempDir::new().unwrap();
        let response = server(&tmp)
            .handle_line(r#"{"jsonrpc":"2.0","id":9,"method":"tools/call","params":{"name":"create_chart","arguments":{"type":"bar","datasets":[]}}}"#)
            .await
            .unwrap();
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(response["result"]["content"][0]["type"], "text");
    }

    #[tokio::test]
    async fn test_serve_writes_one_line_per_request() {
        let tmp = TempDir::new().unwrap();
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
            "\n"
        );
        let mut output = Vec::new();
        serve(&server(&tmp), input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["result"], json!({}));
        assert_eq!(lines[1]["id"], 2);
    }
}
