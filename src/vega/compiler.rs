//! Lowers a subset of Vega-Lite into the canvas engine's figure model.
//!
//! Supported: inline `data.values`; `bar`, `line`, `area`, `point`, `circle`, `square`,
//! `tick` and `arc` marks; the `x`, `y`, `color` and `theta` channels with `aggregate`,
//! `bin`, `title`, `stack` and log scales; and one level of `layer`, `hconcat`, `vconcat`,
//! `concat`, `facet` or `repeat`. Everything else is rejected with an error rather than
//! drawn wrong.

use super::has_composition;
use crate::chart::ColorValue;
use crate::color::parse_color;
use crate::data::{self, compare_text, DataTable, Row};
use crate::error::ChartError;
use crate::graph::{Axis, AxisScale, Figure, Panel, PanelKind, Series, SeriesPoint, SeriesStyle};
use crate::palette::category_color;
use crate::RenderOptions;
use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Room around each view for axes and labels, in pixels.
const VIEW_PADDING: (f64, f64) = (90.0, 80.0);
const TITLE_HEIGHT: f64 = 40.0;
const MAX_FIGURE_SIDE: f64 = 8192.0;
const DEFAULT_MAXBINS: usize = 10;
const MAX_BINS: u64 = 200;

/// Valid Vega-Lite marks this compiler does not draw.
const UNSUPPORTED_MARKS: [&str; 9] = [
    "rect", "rule", "text", "trail", "geoshape", "image", "boxplot", "errorbar", "errorband",
];

/// Valid Vega-Lite aggregates outside the supported set.
const UNSUPPORTED_AGGREGATES: [&str; 18] = [
    "argmax", "argmin", "distinct", "missing", "product", "q1", "q3", "ci0", "ci1", "stderr",
    "stdev", "stdevp", "valid", "values", "variance", "variancep", "exponential",
    "exponentialb",
];

/// Channels that carry no meaning in a static image.
const IGNORED_CHANNELS: [&str; 4] = ["tooltip", "href", "description", "key"];

/// Compile a Vega-Lite spec into a figure. `defaults` supply the view size and
/// background when the spec has none.
pub fn compile(spec: &Value, defaults: &RenderOptions) -> Result<Figure, ChartError> {
    compile_figure(spec, defaults).map_err(|e| ChartError::Compilation(format!("{:#}", e)))
}

// =============================================================================
// Figure and composition
// =============================================================================

/// A compiled view and the size of its plot area.
struct Cell {
    panel: Panel,
    size: (f64, f64),
}

fn compile_figure(spec: &Value, defaults: &RenderOptions) -> Result<Figure> {
    let spec = spec
        .as_object()
        .ok_or_else(|| anyhow!("spec must be a JSON object"))?;
    reject_transforms(spec)?;

    let data = load_data(spec, &DataTable::default())?;
    let view = view_size(
        spec,
        (defaults.width as f64, defaults.height as f64),
    );

    let (cells, columns) = if let Some(children) = spec.get("hconcat") {
        let cells = compile_children(children, &data, view, "hconcat")?;
        let n = cells.len();
        (cells, n)
    } else if let Some(children) = spec.get("vconcat") {
        (compile_children(children, &data, view, "vconcat")?, 1)
    } else if let Some(children) = spec.get("concat") {
        let cells = compile_children(children, &data, view, "concat")?;
        let columns = column_count(spec).unwrap_or(cells.len());
        (cells, columns)
    } else if spec.contains_key("facet") {
        compile_facet(spec, &data, view)?
    } else if spec.contains_key("repeat") {
        compile_repeat(spec, &data, view)?
    } else {
        let panel = compile_view(spec, &data, None)?;
        (vec![Cell { panel, size: view }], 1)
    };

    if cells.is_empty() {
        bail!("composition produced no views");
    }

    let (title, subtitle) = parse_title(spec.get("title"));
    let background = spec
        .get("background")
        .and_then(Value::as_str)
        .unwrap_or(&defaults.background)
        .to_string();

    let cell_w = cells.iter().map(|c| c.size.0).fold(0.0, f64::max) + VIEW_PADDING.0;
    let cell_h = cells.iter().map(|c| c.size.1).fold(0.0, f64::max) + VIEW_PADDING.1;

    let mut figure = Figure {
        width: 0,
        height: 0,
        background,
        title,
        subtitle,
        columns: columns.max(1),
        panels: cells.into_iter().map(|c| c.panel).collect(),
    };
    let (rows, cols) = figure.grid();
    let title_h = match (&figure.title, &figure.subtitle) {
        (None, None) => 0.0,
        (Some(_), Some(_)) => TITLE_HEIGHT * 1.5,
        _ => TITLE_HEIGHT,
    };
    figure.width = (cols as f64 * cell_w).clamp(1.0, MAX_FIGURE_SIDE).round() as u32;
    figure.height = (rows as f64 * cell_h + title_h)
        .clamp(1.0, MAX_FIGURE_SIDE)
        .round() as u32;

    debug!(
        panels = figure.panels.len(),
        width = figure.width,
        height = figure.height,
        "compiled vega-lite spec"
    );
    Ok(figure)
}

/// One unit or layered view; deeper composition is rejected.
fn compile_view(spec: &Map<String, Value>, parent: &DataTable, encoding: Option<&Map<String, Value>>) -> Result<Panel> {
    reject_transforms(spec)?;
    let data = load_data(spec, parent)?;

    if spec.contains_key("layer") {
        compile_layer(spec, &data, encoding)
    } else if has_composition(spec) {
        bail!("nested composition is not supported")
    } else {
        compile_unit(spec, &data, encoding)
    }
}

fn compile_children(
    children: &Value,
    data: &DataTable,
    view: (f64, f64),
    op: &str,
) -> Result<Vec<Cell>> {
    let children = children
        .as_array()
        .ok_or_else(|| anyhow!("'{}' must be an array of views", op))?;

    children
        .iter()
        .enumerate()
        .map(|(i, child)| {
            let child = child
                .as_object()
                .ok_or_else(|| anyhow!("{}[{}] must be an object", op, i))?;
            let mut panel =
                compile_view(child, data, None).with_context(|| format!("{}[{}]", op, i))?;
            panel.title = parse_title(child.get("title")).0;
            Ok(Cell {
                panel,
                size: view_size(child, view),
            })
        })
        .collect()
}

fn compile_layer(
    spec: &Map<String, Value>,
    data: &DataTable,
    inherited: Option<&Map<String, Value>>,
) -> Result<Panel> {
    let layers = spec
        .get("layer")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("'layer' must be an array of views"))?;
    if layers.is_empty() {
        bail!("'layer' must contain at least one view");
    }
    let encoding = merge_encoding(inherited, spec.get("encoding"))?;

    let mut panels = Vec::with_capacity(layers.len());
    for (i, child) in layers.iter().enumerate() {
        let child = child
            .as_object()
            .ok_or_else(|| anyhow!("layer[{}] must be an object", i))?;
        if has_composition(child) {
            bail!("layer[{}]: nested composition is not supported", i);
        }
        reject_transforms(child)?;
        let child_data = load_data(child, data)?;
        let panel = compile_unit(child, &child_data, Some(&encoding))
            .with_context(|| format!("layer[{}]", i))?;
        panels.push(panel);
    }
    merge_panels(panels)
}

/// Overlay layer panels on the first one. Category axes take the union of labels.
fn merge_panels(panels: Vec<Panel>) -> Result<Panel> {
    let mut iter = panels.into_iter();
    let mut base = iter
        .next()
        .ok_or_else(|| anyhow!("'layer' must contain at least one view"))?;

    for layer in iter {
        if layer.kind != base.kind || layer.x_axis.scale != base.x_axis.scale {
            bail!("layers must share the same kind of x axis");
        }
        if base.x_axis.scale == AxisScale::Category && layer.labels != base.labels {
            let mut labels = base.labels.clone();
            for label in &layer.labels {
                if !labels.contains(label) {
                    labels.push(label.clone());
                }
            }
            labels.sort_by(|a, b| compare_text(a, b, true));
            let mut moved = layer;
            realign(&mut base, &labels);
            realign(&mut moved, &labels);
            absorb(&mut base, moved);
        } else {
            absorb(&mut base, layer);
        }
    }
    Ok(base)
}

fn absorb(base: &mut Panel, layer: Panel) {
    base.series.extend(layer.series);
    base.horizontal |= layer.horizontal;
    base.show_legend |= layer.show_legend;
    base.y_axis.stacked |= layer.y_axis.stacked;
    if base.x_axis.title.is_none() {
        base.x_axis.title = layer.x_axis.title;
    }
    if base.y_axis.title.is_none() {
        base.y_axis.title = layer.y_axis.title;
    }
}

/// Re-index category series onto `labels`; missing categories become gaps.
fn realign(panel: &mut Panel, labels: &[String]) {
    let lookup: HashMap<&str, usize> = panel
        .labels
        .iter()
        .enumerate()
        .map(|(i, l)| (l.as_str(), i))
        .collect();
    for series in panel.series.iter_mut() {
        series.points = labels
            .iter()
            .map(|label| {
                lookup
                    .get(label.as_str())
                    .and_then(|&i| series.points.get(i).copied())
                    .unwrap_or(SeriesPoint::value(f64::NAN))
            })
            .collect();
    }
    panel.labels = labels.to_vec();
}

fn compile_facet(
    spec: &Map<String, Value>,
    data: &DataTable,
    view: (f64, f64),
) -> Result<(Vec<Cell>, usize)> {
    let facet = spec
        .get("facet")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("'facet' must be an object"))?;
    let body = spec
        .get("spec")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("facet needs a 'spec' to draw in each cell"))?;

    let field_def = |name: &str, value: Option<&Value>| -> Result<Option<Channel>> {
        value.map(|v| parse_channel(name, v)).transpose()
    };
    let wrapped = facet.contains_key("field");
    let (row, column) = if wrapped {
        (None, field_def("facet", Some(&Value::Object(facet.clone())))?)
    } else {
        (
            field_def("facet.row", facet.get("row"))?,
            field_def("facet.column", facet.get("column"))?,
        )
    };
    if row.is_none() && column.is_none() {
        bail!("facet needs a 'field', 'row' or 'column'");
    }

    let values = |channel: &Option<Channel>| -> Result<Vec<Option<String>>> {
        match channel {
            None => Ok(vec![None]),
            Some(c) => {
                let field = c.require_field("facet")?;
                let found = data.distinct(field, c.kind == FieldType::Temporal);
                if found.is_empty() {
                    bail!("facet field '{}' has no values", field);
                }
                Ok(found.into_iter().map(Some).collect())
            }
        }
    };
    let row_values = values(&row)?;
    let column_values = values(&column)?;

    let mut cells = Vec::with_capacity(row_values.len() * column_values.len());
    for r in &row_values {
        for c in &column_values {
            let subset = data.filter(|rec| {
                facet_match(rec, row.as_ref(), r.as_deref())
                    && facet_match(rec, column.as_ref(), c.as_deref())
            });
            let mut panel = compile_view(body, &subset, None).context("facet spec")?;
            let parts: Vec<&str> = [r.as_deref(), c.as_deref()].into_iter().flatten().collect();
            panel.title = Some(parts.join(", "));
            cells.push(Cell {
                panel,
                size: view_size(body, view),
            });
        }
    }

    let columns = if wrapped {
        column_count(spec).unwrap_or(cells.len())
    } else {
        column_values.len()
    };
    Ok((cells, columns))
}

fn facet_match(row: &Row, channel: Option<&Channel>, value: Option<&str>) -> bool {
    match (channel.and_then(|c| c.field.as_deref()), value) {
        (Some(field), Some(value)) => data::text(row, field).as_deref() == Some(value),
        _ => true,
    }
}

fn compile_repeat(
    spec: &Map<String, Value>,
    data: &DataTable,
    view: (f64, f64),
) -> Result<(Vec<Cell>, usize)> {
    let body = spec
        .get("spec")
        .ok_or_else(|| anyhow!("repeat needs a 'spec' to instantiate"))?;

    let fields = |v: Option<&Value>| -> Result<Vec<Option<Value>>> {
        match v {
            None => Ok(vec![None]),
            Some(Value::Array(items)) => Ok(items.iter().cloned().map(Some).collect()),
            Some(_) => bail!("repeat row/column must be an array of field names"),
        }
    };

    let mut instances: Vec<Value> = Vec::new();
    let columns = match spec.get("repeat") {
        Some(Value::Array(items)) => {
            for item in items {
                instances.push(substitute(body, &[("repeat", item)]));
            }
            column_count(spec).unwrap_or(items.len())
        }
        Some(Value::Object(repeat)) => {
            if repeat.contains_key("layer") {
                bail!("repeated layers are not supported");
            }
            let rows = fields(repeat.get("row"))?;
            let cols = fields(repeat.get("column"))?;
            for r in &rows {
                for c in &cols {
                    let mut bindings: Vec<(&str, &Value)> = Vec::new();
                    if let Some(r) = r {
                        bindings.push(("row", r));
                    }
                    if let Some(c) = c {
                        bindings.push(("column", c));
                    }
                    instances.push(substitute(body, &bindings));
                }
            }
            cols.len()
        }
        _ => bail!("'repeat' must be an array of fields or an object with 'row'/'column'"),
    };

    let cells = instances
        .iter()
        .enumerate()
        .map(|(i, instance)| {
            let child = instance
                .as_object()
                .ok_or_else(|| anyhow!("repeat 'spec' must be an object"))?;
            let panel = compile_view(child, data, None).with_context(|| format!("repeat[{}]", i))?;
            Ok(Cell {
                panel,
                size: view_size(child, view),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((cells, columns))
}

/// Replace `{"repeat": name}` references with the bound field.
fn substitute(value: &Value, bindings: &[(&str, &Value)]) -> Value {
    match value {
        Value::Object(obj) => {
            if obj.len() == 1 {
                if let Some(Value::String(name)) = obj.get("repeat") {
                    if let Some((_, bound)) = bindings.iter().find(|(k, _)| *k == name.as_str()) {
                        return (*bound).clone();
                    }
                }
            }
            Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), substitute(v, bindings)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, bindings)).collect()),
        other => other.clone(),
    }
}

// =============================================================================
// Spec helpers
// =============================================================================

fn reject_transforms(spec: &Map<String, Value>) -> Result<()> {
    match spec.get("transform") {
        Some(Value::Array(t)) if t.is_empty() => Ok(()),
        Some(_) => bail!("transforms are not supported"),
        None => Ok(()),
    }
}

/// The view's own inline data, or the inherited table.
fn load_data(spec: &Map<String, Value>, inherited: &DataTable) -> Result<DataTable> {
    match spec.get("data") {
        None | Some(Value::Null) => Ok(inherited.clone()),
        Some(Value::Object(data)) => {
            if data.contains_key("url") {
                bail!("data.url is not supported; provide the rows inline as data.values");
            }
            if let Some(values) = data.get("values") {
                return DataTable::from_json(values);
            }
            if data.contains_key("name") {
                bail!("named data sources are not supported");
            }
            bail!("data must provide inline 'values'")
        }
        Some(_) => bail!("data must be an object"),
    }
}

fn view_size(spec: &Map<String, Value>, fallback: (f64, f64)) -> (f64, f64) {
    (
        spec.get("width").and_then(Value::as_f64).unwrap_or(fallback.0),
        spec.get("height").and_then(Value::as_f64).unwrap_or(fallback.1),
    )
}

fn column_count(spec: &Map<String, Value>) -> Option<usize> {
    spec.get("columns")
        .and_then(Value::as_u64)
        .filter(|&c| c > 0)
        .map(|c| c as usize)
}

/// `title` as a string, an array of lines, or `{text, subtitle}`.
fn parse_title(value: Option<&Value>) -> (Option<String>, Option<String>) {
    fn text(v: Option<&Value>) -> Option<String> {
        match v? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Array(lines) => {
                let joined: Vec<&str> = lines.iter().filter_map(Value::as_str).collect();
                (!joined.is_empty()).then(|| joined.join(" "))
            }
            _ => None,
        }
    }
    match value {
        Some(Value::Object(t)) => (text(t.get("text")), text(t.get("subtitle"))),
        other => (text(other), None),
    }
}

fn merge_encoding(
    inherited: Option<&Map<String, Value>>,
    own: Option<&Value>,
) -> Result<Map<String, Value>> {
    let mut merged = inherited.cloned().unwrap_or_default();
    match own {
        None | Some(Value::Null) => {}
        Some(Value::Object(own)) => {
            for (k, v) in own {
                merged.insert(k.clone(), v.clone());
            }
        }
        Some(_) => bail!("encoding must be an object"),
    }
    Ok(merged)
}

// =============================================================================
// Marks and channels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkKind {
    Bar,
    Line,
    Area,
    Point,
    Circle,
    Square,
    Tick,
    Arc,
}

#[derive(Debug, Clone, PartialEq)]
struct Mark {
    kind: MarkKind,
    color: Option<String>,
    opacity: Option<f64>,
    inner_radius: f64,
    interpolate: Option<String>,
    point: bool,
}

fn parse_mark(value: &Value) -> Result<Mark> {
    let (name, props) = match value {
        Value::String(name) => (name.as_str(), None),
        Value::Object(obj) => (
            obj.get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("mark object needs a 'type'"))?,
            Some(obj),
        ),
        _ => bail!("mark must be a string or an object with a 'type'"),
    };

    let kind = match name {
        "bar" => MarkKind::Bar,
        "line" => MarkKind::Line,
        "area" => MarkKind::Area,
        "point" => MarkKind::Point,
        "circle" => MarkKind::Circle,
        "square" => MarkKind::Square,
        "tick" => MarkKind::Tick,
        "arc" => MarkKind::Arc,
        other if UNSUPPORTED_MARKS.contains(&other) => {
            bail!("mark '{}' is not supported", other)
        }
        other => bail!("invalid mark type '{}'", other),
    };

    let prop = |key: &str| props.and_then(|p| p.get(key));
    Ok(Mark {
        kind,
        color: prop("color")
            .or_else(|| prop("fill"))
            .and_then(Value::as_str)
            .map(str::to_string),
        opacity: prop("opacity").and_then(Value::as_f64),
        inner_radius: prop("innerRadius").and_then(Value::as_f64).unwrap_or(0.0),
        interpolate: prop("interpolate").and_then(Value::as_str).map(str::to_string),
        point: prop("point").map_or(false, |p| !matches!(p, Value::Bool(false) | Value::Null)),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Quantitative,
    Ordinal,
    Nominal,
    Temporal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aggregate {
    Count,
    Sum,
    Mean,
    Median,
    Min,
    Max,
}

impl Aggregate {
    fn parse(op: &str) -> Result<Self> {
        Ok(match op {
            "count" => Aggregate::Count,
            "sum" => Aggregate::Sum,
            "mean" | "average" => Aggregate::Mean,
            "median" => Aggregate::Median,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            other if UNSUPPORTED_AGGREGATES.contains(&other) => {
                bail!("aggregate '{}' is not supported", other)
            }
            other => bail!("invalid aggregate '{}'", other),
        })
    }

    fn label(self) -> &'static str {
        match self {
            Aggregate::Count => "Count",
            Aggregate::Sum => "Sum",
            Aggregate::Mean => "Average",
            Aggregate::Median => "Median",
            Aggregate::Min => "Min",
            Aggregate::Max => "Max",
        }
    }

    /// Combine the numeric values found in `rows` records. Empty groups give NaN,
    /// except for counts.
    fn apply(self, values: &[f64], rows: usize) -> f64 {
        if self == Aggregate::Count {
            return rows as f64;
        }
        if values.is_empty() {
            return f64::NAN;
        }
        match self {
            Aggregate::Count => rows as f64,
            Aggregate::Sum => values.iter().sum(),
            Aggregate::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregate::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Aggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Channel {
    field: Option<String>,
    kind: FieldType,
    aggregate: Option<Aggregate>,
    /// Maximum bin count when binned.
    bin: Option<usize>,
    title: Option<String>,
    stack: bool,
    log: bool,
    zero: Option<bool>,
    value: Option<Value>,
}

impl Channel {
    fn require_field(&self, name: &str) -> Result<&str> {
        self.field
            .as_deref()
            .ok_or_else(|| anyhow!("encoding.{} needs a 'field'", name))
    }

    fn is_discrete(&self) -> bool {
        self.kind != FieldType::Quantitative && self.bin.is_none()
    }

    fn temporal(&self) -> bool {
        self.kind == FieldType::Temporal
    }

    /// Axis title: explicit title, else one derived from the field and aggregate.
    fn axis_title(&self) -> Option<String> {
        if self.title.is_some() {
            return self.title.clone();
        }
        match (self.aggregate, &self.field) {
            (Some(Aggregate::Count), _) => Some("Count of Records".to_string()),
            (Some(agg), Some(field)) => Some(format!("{} of {}", agg.label(), field)),
            (None, Some(field)) if self.bin.is_some() => Some(format!("{} (binned)", field)),
            (None, Some(field)) => Some(field.clone()),
            _ => None,
        }
    }
}

fn parse_channel(name: &str, value: &Value) -> Result<Channel> {
    let def = value
        .as_object()
        .ok_or_else(|| anyhow!("encoding.{} must be an object", name))?;

    let field = match def.get("field") {
        None | Some(Value::Null) => None,
        Some(Value::String(f)) => Some(f.clone()),
        Some(Value::Object(_)) => bail!("encoding.{} has an unresolved field reference", name),
        Some(_) => bail!("encoding.{}.field must be a string", name),
    };

    let aggregate = match def.get("aggregate") {
        None | Some(Value::Null) => None,
        Some(Value::String(op)) => Some(Aggregate::parse(op)?),
        Some(_) => bail!("encoding.{}.aggregate must be a string", name),
    };

    let bin = match def.get("bin") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::Bool(true)) => Some(DEFAULT_MAXBINS),
        Some(Value::Object(params)) => match params.get("maxbins").and_then(Value::as_u64) {
            None => Some(DEFAULT_MAXBINS),
            Some(n) if n > MAX_BINS => {
                bail!("encoding.{}.bin.maxbins must be at most {}, got {}", name, MAX_BINS, n)
            }
            Some(n) => Some(n.max(1) as usize),
        },
        Some(_) => bail!("encoding.{}.bin is not supported in this form", name),
    };

    let kind = match def.get("type").and_then(Value::as_str) {
        Some("quantitative") => FieldType::Quantitative,
        Some("ordinal") => FieldType::Ordinal,
        Some("nominal") => FieldType::Nominal,
        Some("temporal") => FieldType::Temporal,
        Some("geojson") => bail!("encoding.{}: type 'geojson' is not supported", name),
        Some(other) => bail!("encoding.{}: invalid type '{}'", name, other),
        None if aggregate.is_some() || bin.is_some() => FieldType::Quantitative,
        None => FieldType::Nominal,
    };

    let title = def
        .get("title")
        .and_then(Value::as_str)
        .or_else(|| {
            def.get("axis")
                .and_then(|a| a.get("title"))
                .and_then(Value::as_str)
        })
        .map(str::to_string);

    let scale = def.get("scale").and_then(Value::as_object);
    Ok(Channel {
        field,
        kind,
        aggregate,
        bin,
        title,
        stack: !matches!(def.get("stack"), Some(Value::Null) | Some(Value::Bool(false))),
        log: scale.and_then(|s| s.get("type")).and_then(Value::as_str) == Some("log"),
        zero: scale.and_then(|s| s.get("zero")).and_then(Value::as_bool),
        value: def.get("value").cloned(),
    })
}

// =============================================================================
// Unit views
// =============================================================================

fn compile_unit(
    spec: &Map<String, Value>,
    data: &DataTable,
    inherited: Option<&Map<String, Value>>,
) -> Result<Panel> {
    let mark = parse_mark(
        spec.get("mark")
            .ok_or_else(|| anyhow!("view has neither 'mark' nor a composition operator"))?,
    )?;
    let encoding = merge_encoding(inherited, spec.get("encoding"))?;

    let mut channels: HashMap<&str, Channel> = HashMap::new();
    for (name, def) in &encoding {
        match name.as_str() {
            "x" | "y" | "color" | "theta" => {
                channels.insert(name.as_str(), parse_channel(name, def)?);
            }
            other if IGNORED_CHANNELS.contains(&other) => {}
            other => debug!(channel = other, "ignoring unsupported encoding channel"),
        }
    }

    let color = channels.remove("color");
    if mark.kind == MarkKind::Arc {
        let theta = channels
            .remove("theta")
            .ok_or_else(|| anyhow!("arc marks need a 'theta' channel"))?;
        compile_arc(&mark, &theta, color.as_ref(), data)
    } else {
        compile_cartesian(
            &mark,
            channels.remove("x"),
            channels.remove("y"),
            color.as_ref(),
            data,
        )
    }
}

fn numbers(rows: &[&Row], field: Option<&str>) -> Vec<f64> {
    match field {
        Some(f) => rows.iter().filter_map(|r| data::number(r, f)).collect(),
        None => Vec::new(),
    }
}

fn aggregate_rows(rows: &[&Row], channel: Option<&Channel>, default: Aggregate) -> f64 {
    match channel {
        None => Aggregate::Count.apply(&[], rows.len()),
        Some(c) => {
            let op = c
                .aggregate
                .unwrap_or(if c.field.is_none() { Aggregate::Count } else { default });
            op.apply(&numbers(rows, c.field.as_deref()), rows.len())
        }
    }
}

/// Series color: the mark's color, a constant color encoding, or the category scheme.
fn series_color(mark: &Mark, color: Option<&Channel>, group: usize) -> String {
    let base = mark
        .color
        .clone()
        .or_else(|| {
            color
                .and_then(|c| c.value.as_ref())
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| category_color(group).to_string());
    match (mark.opacity, parse_color(&base)) {
        (Some(opacity), Some(c)) => format!(
            "rgba({}, {}, {}, {})",
            c.0,
            c.1,
            c.2,
            (c.3 * opacity).clamp(0.0, 1.0)
        ),
        _ => base,
    }
}

fn compile_arc(mark: &Mark, theta: &Channel, color: Option<&Channel>, data: &DataTable) -> Result<Panel> {
    let all: Vec<&Row> = data.rows().iter().collect();
    let color_field = color.and_then(|c| c.field.as_deref());

    let (labels, values) = match color_field {
        Some(field) => {
            let temporal = color.map_or(false, Channel::temporal);
            let labels = data.distinct(field, temporal);
            let values = labels
                .iter()
                .map(|label| {
                    let rows: Vec<&Row> = all
                        .iter()
                        .copied()
                        .filter(|r| data::text(r, field).as_deref() == Some(label.as_str()))
                        .collect();
                    aggregate_rows(&rows, Some(theta), Aggregate::Sum)
                })
                .collect::<Vec<_>>();
            (labels, values)
        }
        None => (
            vec![theta.axis_title().unwrap_or_default()],
            vec![aggregate_rows(&all, Some(theta), Aggregate::Sum)],
        ),
    };

    let kind = if mark.inner_radius > 0.0 {
        PanelKind::Doughnut
    } else {
        PanelKind::Pie
    };
    let mut panel = Panel::new(kind);
    panel.show_legend = color_field.is_some();

    let fills: Vec<String> = (0..labels.len())
        .map(|i| series_color(mark, color, i))
        .collect();
    let mut series = Series::new(
        SeriesStyle::Bar,
        values.into_iter().map(SeriesPoint::value).collect(),
    );
    series.fill = Some(ColorValue::Many(fills));
    series.border = Some(ColorValue::Single("white".to_string()));
    series.border_width = 1.0;
    panel.series.push(series);
    panel.labels = labels;
    Ok(panel)
}

/// How the index axis positions data.
#[derive(Debug, Clone, PartialEq)]
enum Domain {
    Category(Vec<String>),
    Bins(Bins),
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bins {
    start: f64,
    step: f64,
    count: usize,
}

impl Bins {
    /// Nice bins (steps of 1, 2 or 5 times a power of ten) covering `[lo, hi]`.
    fn new(lo: f64, hi: f64, maxbins: usize) -> Self {
        if hi <= lo || !(hi - lo).is_finite() {
            return Self {
                start: lo.floor(),
                step: 1.0,
                count: 1,
            };
        }
        let raw = (hi - lo) / maxbins.max(1) as f64;
        let magnitude = 10f64.powf(raw.log10().floor());
        let step = [1.0, 2.0, 5.0, 10.0]
            .iter()
            .map(|m| m * magnitude)
            .find(|s| *s >= raw * (1.0 - 1e-9))
            .unwrap_or(10.0 * magnitude);
        let start = (lo / step).floor() * step;
        let count = (((hi - start) / step).ceil() as usize).clamp(1, maxbins.max(1) + 1);
        Self { start, step, count }
    }

    fn index(&self, v: f64) -> Option<usize> {
        if !v.is_finite() || v < self.start {
            return None;
        }
        Some((((v - self.start) / self.step).floor() as usize).min(self.count - 1))
    }

    fn center(&self, i: usize) -> f64 {
        self.start + (i as f64 + 0.5) * self.step
    }
}

fn series_style(kind: MarkKind) -> SeriesStyle {
    match kind {
        MarkKind::Bar => SeriesStyle::Bar,
        MarkKind::Line => SeriesStyle::Line,
        MarkKind::Area => SeriesStyle::Area,
        MarkKind::Point | MarkKind::Circle | MarkKind::Square | MarkKind::Tick | MarkKind::Arc => {
            SeriesStyle::Point
        }
    }
}

fn styled_series(mark: &Mark, color: String, points: Vec<SeriesPoint>) -> Series {
    let mut series = Series::new(series_style(mark.kind), points);
    match mark.kind {
        MarkKind::Bar => {
            series.border_width = 0.0;
            series.fill = Some(ColorValue::Single(color));
        }
        MarkKind::Line | MarkKind::Area => {
            series.border_width = 2.0;
            series.point_radius = if mark.point { 3.0 } else { 0.0 };
            series.tension = match mark.interpolate.as_deref() {
                Some("monotone" | "basis" | "cardinal" | "natural" | "catmull-rom") => 0.4,
                _ => 0.0,
            };
            series.fill = Some(ColorValue::Single(color.clone()));
            series.border = Some(ColorValue::Single(color));
        }
        // Points are hollow unless drawn as circles or squares.
        MarkKind::Point => {
            series.border_width = 2.0;
            series.fill = Some(ColorValue::Single("transparent".to_string()));
            series.border = Some(ColorValue::Single(color));
        }
        MarkKind::Tick => {
            series.point_radius = 2.0;
            series.fill = Some(ColorValue::Single(color.clone()));
            series.border = Some(ColorValue::Single(color));
        }
        MarkKind::Circle | MarkKind::Square | MarkKind::Arc => {
            series.fill = Some(ColorValue::Single(color.clone()));
            series.border = Some(ColorValue::Single(color));
        }
    }
    series
}

fn compile_cartesian(
    mark: &Mark,
    x: Option<Channel>,
    y: Option<Channel>,
    color: Option<&Channel>,
    data: &DataTable,
) -> Result<Panel> {
    // Index channel positions data; value channel measures it.
    let (index, value, horizontal) = match (x, y) {
        (Some(x), Some(y)) => {
            if !x.is_discrete() && x.bin.is_none() && (y.is_discrete() || y.bin.is_some()) {
                (Some(y), Some(x), true)
            } else {
                (Some(x), Some(y), false)
            }
        }
        (Some(x), None) => (Some(x), None, false),
        (None, Some(y)) if y.is_discrete() || y.bin.is_some() => (Some(y), None, true),
        (None, Some(y)) => (None, Some(y), false),
        (None, None) => bail!("encoding needs an 'x' or 'y' channel"),
    };
    let (index_name, value_name) = if horizontal { ("y", "x") } else { ("x", "y") };

    let domain = match &index {
        Some(c) if c.bin.is_some() => {
            let field = c.require_field(index_name)?;
            let values: Vec<f64> = data.rows().iter().filter_map(|r| data::number(r, field)).collect();
            let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if values.is_empty() {
                Domain::Bins(Bins::new(0.0, 0.0, 1))
            } else {
                Domain::Bins(Bins::new(lo, hi, c.bin.unwrap_or(DEFAULT_MAXBINS)))
            }
        }
        Some(c) if c.is_discrete() => {
            let field = c.require_field(index_name)?;
            Domain::Category(data.distinct(field, c.temporal()))
        }
        _ => Domain::Continuous,
    };

    // Split rows by the color field.
    let color_field = color.and_then(|c| c.field.as_deref());
    let groups: Vec<(Option<String>, Vec<&Row>)> = match color_field {
        Some(field) => data
            .distinct(field, color.map_or(false, Channel::temporal))
            .into_iter()
            .map(|key| {
                let rows = data
                    .rows()
                    .iter()
                    .filter(|r| data::text(r, field).as_deref() == Some(key.as_str()))
                    .collect();
                (Some(key), rows)
            })
            .collect(),
        None => vec![(None, data.rows().iter().collect())],
    };

    let default_aggregate = match mark.kind {
        MarkKind::Bar | MarkKind::Area => Aggregate::Sum,
        _ => Aggregate::Mean,
    };

    let mut series_list = Vec::with_capacity(groups.len());
    for (group_index, (key, rows)) in groups.iter().enumerate() {
        let points = match &domain {
            Domain::Category(keys) => {
                let field = index.as_ref().and_then(|c| c.field.as_deref()).unwrap_or_default();
                let slot: HashMap<&str, usize> =
                    keys.iter().enumerate().map(|(i, k)| (k.as_str(), i)).collect();
                let mut buckets: Vec<Vec<&Row>> = vec![Vec::new(); keys.len()];
                for row in rows {
                    if let Some(i) = data::text(row, field).and_then(|t| slot.get(t.as_str()).copied()) {
                        buckets[i].push(*row);
                    }
                }
                buckets
                    .iter()
                    .map(|b| {
                        let v = if b.is_empty() {
                            f64::NAN
                        } else {
                            aggregate_rows(b, value.as_ref(), default_aggregate)
                        };
                        SeriesPoint::value(v)
                    })
                    .collect()
            }
            Domain::Bins(bins) => {
                let field = index.as_ref().and_then(|c| c.field.as_deref()).unwrap_or_default();
                let mut buckets: Vec<Vec<&Row>> = vec![Vec::new(); bins.count];
                for row in rows {
                    if let Some(i) = data::number(row, field).and_then(|v| bins.index(v)) {
                        buckets[i].push(*row);
                    }
                }
                buckets
                    .iter()
                    .enumerate()
                    .map(|(i, b)| {
                        SeriesPoint::xy(bins.center(i), aggregate_rows(b, value.as_ref(), Aggregate::Count))
                    })
                    .collect()
            }
            Domain::Continuous => continuous_points(rows, index.as_ref(), value.as_ref(), mark.kind),
        };
        let mut series = styled_series(mark, series_color(mark, color, group_index), points);
        series.label = key.clone();
        series_list.push(series);
    }

    let stacked = matches!(mark.kind, MarkKind::Bar | MarkKind::Area)
        && color_field.is_some()
        && domain != Domain::Continuous
        && value.as_ref().map_or(true, |v| v.stack);

    let mut panel = Panel::new(PanelKind::Cartesian);
    panel.horizontal = horizontal;
    panel.show_legend = color_field.is_some();
    panel.x_axis = match &domain {
        Domain::Category(_) => Axis::category(),
        _ => Axis::linear(),
    };
    if index.as_ref().map_or(false, |c| c.log) && domain == Domain::Continuous {
        panel.x_axis.scale = AxisScale::Log;
    }
    panel.x_axis.title = index.as_ref().and_then(Channel::axis_title);

    panel.y_axis = Axis::linear();
    panel.y_axis.title = match &value {
        Some(c) => c.axis_title(),
        None if index.is_some() => Some("Count of Records".to_string()),
        None => None,
    };
    if value.as_ref().map_or(false, |c| c.log) {
        panel.y_axis.scale = AxisScale::Log;
    }
    panel.y_axis.begin_at_zero = value.as_ref().and_then(|c| c.zero).unwrap_or(true);
    panel.y_axis.stacked = stacked;
    debug!(value_channel = value_name, stacked, "lowered unit view");

    if let Domain::Category(keys) = domain {
        panel.labels = keys;
    }
    panel.series = series_list;
    Ok(panel)
}

/// Points for two continuous channels. An aggregated value channel groups rows by the
/// index value; otherwise every row with both numbers becomes a point.
fn continuous_points(
    rows: &[&Row],
    index: Option<&Channel>,
    value: Option<&Channel>,
    kind: MarkKind,
) -> Vec<SeriesPoint> {
    let index_field = index.and_then(|c| c.field.as_deref());
    let value_field = value.and_then(|c| c.field.as_deref());
    let position = |i: usize, row: &Row| match index_field {
        Some(f) => data::number(row, f),
        None => Some(i as f64),
    };

    let mut points: Vec<SeriesPoint> = if let Some(agg) = value.and_then(|c| c.aggregate) {
        let mut groups: Vec<(f64, Vec<&Row>)> = Vec::new();
        for (i, &row) in rows.iter().enumerate() {
            let Some(x) = position(i, row) else { continue };
            match groups.iter_mut().find(|(gx, _)| *gx == x) {
                Some((_, members)) => members.push(row),
                None => groups.push((x, vec![row])),
            }
        }
        groups
            .into_iter()
            .map(|(x, members)| SeriesPoint::xy(x, agg.apply(&numbers(&members, value_field), members.len())))
            .collect()
    } else {
        rows.iter()
            .enumerate()
            .filter_map(|(i, &row)| {
                let x = position(i, row)?;
                let y = match value_field {
                    Some(f) => data::number(row, f)?,
                    None => 0.0,
                };
                Some(SeriesPoint::xy(x, y))
            })
            .collect()
    };

    if matches!(kind, MarkKind::Line | MarkKind::Area) || value.and_then(|c| c.aggregate).is_some() {
        points.sort_by(|a, b| a.x.unwrap_or(0.0).total_cmp(&b.x.unwrap_or(0.0)));
    }
    points
}
