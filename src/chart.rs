// Request model for the simple chart-description dialect

use crate::OutputFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The ten supported chart kinds, with their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartFamily {
    Bar,
    Line,
    Pie,
    Doughnut,
    Scatter,
    Area,
    Radar,
    Bubble,
    PolarArea,
    Histogram,
}

impl ChartFamily {
    pub const ALL: [ChartFamily; 10] = [
        ChartFamily::Bar,
        ChartFamily::Line,
        ChartFamily::Pie,
        ChartFamily::Doughnut,
        ChartFamily::Scatter,
        ChartFamily::Area,
        ChartFamily::Radar,
        ChartFamily::Bubble,
        ChartFamily::PolarArea,
        ChartFamily::Histogram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChartFamily::Bar => "bar",
            ChartFamily::Line => "line",
            ChartFamily::Pie => "pie",
            ChartFamily::Doughnut => "doughnut",
            ChartFamily::Scatter => "scatter",
            ChartFamily::Area => "area",
            ChartFamily::Radar => "radar",
            ChartFamily::Bubble => "bubble",
            ChartFamily::PolarArea => "polarArea",
            ChartFamily::Histogram => "histogram",
        }
    }

    /// Colored per data point, drawn without axes.
    pub fn is_segmented(&self) -> bool {
        matches!(
            self,
            ChartFamily::Pie | ChartFamily::Doughnut | ChartFamily::PolarArea
        )
    }

    /// Expects one label per data point.
    pub fn is_label_keyed(&self) -> bool {
        matches!(
            self,
            ChartFamily::Bar
                | ChartFamily::Line
                | ChartFamily::Area
                | ChartFamily::Radar
                | ChartFamily::Histogram
        )
    }

    /// Expects `{x, y}` data points.
    pub fn is_coordinate_pair(&self) -> bool {
        matches!(self, ChartFamily::Scatter | ChartFamily::Bubble)
    }

    /// Drawn without cartesian axes.
    pub fn is_radial(&self) -> bool {
        self.is_segmented() || matches!(self, ChartFamily::Radar)
    }
}

impl std::fmt::Display for ChartFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A color field: one color for the whole dataset or one per data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorValue {
    Single(String),
    Many(Vec<String>),
}

impl ColorValue {
    /// Color for the data point at `index`, if one is defined.
    pub fn at(&self, index: usize) -> Option<&str> {
        match self {
            ColorValue::Single(c) => Some(c.as_str()),
            ColorValue::Many(colors) => colors.get(index).map(String::as_str),
        }
    }
}

/// Coordinate-style data point. Fields are optional so presence can be validated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataPoint {
    Number(f64),
    Point(PointValue),
}

impl DataPoint {
    pub fn xy(x: f64, y: f64) -> Self {
        DataPoint::Point(PointValue {
            x: Some(x),
            y: Some(y),
            r: None,
        })
    }

    pub fn xyr(x: f64, y: f64, r: f64) -> Self {
        DataPoint::Point(PointValue {
            x: Some(x),
            y: Some(y),
            r: Some(r),
        })
    }

    /// The value plotted on the value axis.
    pub fn value(&self) -> Option<f64> {
        match self {
            DataPoint::Number(v) => Some(*v),
            DataPoint::Point(p) => p.y,
        }
    }

    pub fn x(&self) -> Option<f64> {
        match self {
            DataPoint::Number(_) => None,
            DataPoint::Point(p) => p.x,
        }
    }

    pub fn r(&self) -> Option<f64> {
        match self {
            DataPoint::Number(_) => None,
            DataPoint::Point(p) => p.r,
        }
    }

    pub fn has_xy(&self) -> bool {
        matches!(self, DataPoint::Point(p) if p.x.is_some() && p.y.is_some())
    }

    pub fn has_xyr(&self) -> bool {
        matches!(self, DataPoint::Point(p) if p.x.is_some() && p.y.is_some() && p.r.is_some())
    }
}

/// One data series. Unknown keys are kept in `extra` and forwarded to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub data: Vec<DataPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<ColorValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<ColorValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Dataset {
    pub fn new(label: Option<&str>, data: Vec<DataPoint>) -> Self {
        Self {
            label: label.map(str::to_string),
            data,
            ..Default::default()
        }
    }

    pub fn from_values(label: Option<&str>, values: &[f64]) -> Self {
        Self::new(label, values.iter().copied().map(DataPoint::Number).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexAxis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisType {
    Linear,
    Logarithmic,
}

/// Display options. Width and height must lie in `[50, 4096]` when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_legend: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_axis: Option<IndexAxis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_type: Option<AxisType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_at_zero: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tension: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_data_labels: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Arguments of the `create_chart` tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDescription {
    #[serde(rename = "type")]
    pub chart_type: ChartFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    pub datasets: Vec<Dataset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<DisplayOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_open: Option<bool>,
}

impl ChartDescription {
    pub fn new(chart_type: ChartFamily, datasets: Vec<Dataset>) -> Self {
        Self {
            chart_type,
            labels: None,
            datasets,
            options: None,
            output_format: None,
            output_path: None,
            auto_open: None,
        }
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = Some(labels.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn with_options(mut self, options: DisplayOptions) -> Self {
        self.options = Some(options);
        self
    }
}
