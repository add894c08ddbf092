// Render orchestration for the simple chart dialect

use crate::chart::{AxisType, ChartDescription, ChartFamily, Dataset, DisplayOptions, IndexAxis};
use crate::error::Result;
use crate::graph::{self, Axis, AxisScale, Figure, Panel, PanelKind, Series, SeriesPoint, SeriesStyle};
use crate::palette::apply_color_palette;
use crate::validation::validate_chart_input;
use crate::{OutputFormat, RenderOptions, RenderResult};
use anyhow::Context;
use serde_json::Value;
use tracing::debug;

/// Validate, normalize and render a chart description.
pub async fn render_chart(input: &ChartDescription) -> Result<RenderResult> {
    validate_chart_input(input)?;

    let figure = build_figure(input);
    let format = input.output_format.unwrap_or_default();
    debug!(
        chart_type = %input.chart_type,
        datasets = input.datasets.len(),
        width = figure.width,
        height = figure.height,
        "rendering chart"
    );

    render_figure(figure, format).await
}

/// Draw a figure in the requested format. PNG rasterization runs on a blocking worker.
pub async fn render_figure(figure: Figure, format: OutputFormat) -> Result<RenderResult> {
    let bytes = match format {
        OutputFormat::Svg => graph::render_svg(&figure)?.into_bytes(),
        OutputFormat::Png => tokio::task::spawn_blocking(move || graph::render_png(&figure))
            .await
            .context("PNG render task failed")??,
    };
    Ok(RenderResult::new(bytes, format))
}

// =============================================================================
// Description -> figure
// =============================================================================

/// Lower a validated description into the canvas engine's figure model.
pub(crate) fn build_figure(input: &ChartDescription) -> Figure {
    let family = input.chart_type;
    let defaults = DisplayOptions::default();
    let opts = input.options.as_ref().unwrap_or(&defaults);
    let labels = input.labels.clone().unwrap_or_default();

    let mut datasets = apply_color_palette(&input.datasets, family);
    if family == ChartFamily::Area {
        for ds in datasets.iter_mut() {
            ds.fill = Some(ds.fill.unwrap_or(true));
        }
    }

    let mut panel = Panel::new(panel_kind(family));
    panel.show_legend = opts.show_legend.unwrap_or(true);
    panel.data_labels = opts.show_data_labels.unwrap_or(false);
    panel.horizontal = opts.index_axis == Some(IndexAxis::Y) && !family.is_radial();

    // Histograms place bars on a linear x scale when every label is numeric.
    let numeric_labels: Option<Vec<f64>> = if family == ChartFamily::Histogram {
        labels.iter().map(|l| l.trim().parse::<f64>().ok()).collect()
    } else {
        None
    };

    panel.x_axis = match family {
        ChartFamily::Scatter | ChartFamily::Bubble => Axis::linear(),
        ChartFamily::Histogram if numeric_labels.is_some() => Axis::linear(),
        _ => Axis::category(),
    };
    let mut value_axis = Axis::linear();
    if opts.y_axis_type == Some(AxisType::Logarithmic) {
        value_axis.scale = AxisScale::Log;
    }
    value_axis.stacked = opts.stacked.unwrap_or(false);
    value_axis.begin_at_zero = opts.begin_at_zero.unwrap_or(false);
    panel.y_axis = value_axis;

    // Axis labels name the drawn x and y axes, which swap roles for horizontal charts.
    let (index_title, value_title) = if panel.horizontal {
        (opts.y_axis_label.clone(), opts.x_axis_label.clone())
    } else {
        (opts.x_axis_label.clone(), opts.y_axis_label.clone())
    };
    panel.x_axis.title = index_title;
    panel.y_axis.title = value_title;

    panel.series = datasets
        .iter()
        .map(|ds| build_series(ds, family, opts, numeric_labels.as_deref()))
        .collect();
    panel.labels = labels;

    let render = RenderOptions::default();
    let mut figure = Figure::single(
        opts.width.map_or(render.width, |w| w.round() as u32),
        opts.height.map_or(render.height, |h| h.round() as u32),
        opts.background_color.as_deref().unwrap_or(&render.background),
        panel,
    );
    figure.title = opts.title.clone().filter(|t| !t.is_empty());
    figure.subtitle = opts.subtitle.clone().filter(|t| !t.is_empty());
    figure
}

fn panel_kind(family: ChartFamily) -> PanelKind {
    match family {
        ChartFamily::Pie => PanelKind::Pie,
        ChartFamily::Doughnut => PanelKind::Doughnut,
        ChartFamily::PolarArea => PanelKind::PolarArea,
        ChartFamily::Radar => PanelKind::Radar,
        _ => PanelKind::Cartesian,
    }
}

fn series_style(family: ChartFamily, fill: bool) -> SeriesStyle {
    match family {
        ChartFamily::Line | ChartFamily::Area if fill => SeriesStyle::Area,
        ChartFamily::Line | ChartFamily::Area | ChartFamily::Radar => SeriesStyle::Line,
        ChartFamily::Scatter => SeriesStyle::Point,
        ChartFamily::Bubble => SeriesStyle::Bubble,
        _ => SeriesStyle::Bar,
    }
}

fn build_series(
    ds: &Dataset,
    family: ChartFamily,
    opts: &DisplayOptions,
    positions: Option<&[f64]>,
) -> Series {
    let points = ds
        .data
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let y = point.value().unwrap_or(f64::NAN);
            let x = match positions {
                Some(xs) => xs.get(i).copied(),
                None => point.x(),
            };
            SeriesPoint { x, y, r: point.r() }
        })
        .collect();

    let mut series = Series::new(series_style(family, ds.fill.unwrap_or(false)), points);
    series.label = ds.label.clone();
    series.fill = ds.background_color.clone();
    series.border = ds.border_color.clone();
    if let Some(width) = ds.border_width {
        series.border_width = width;
    }

    // Dataset passthrough keys beat chart-wide options.
    series.tension = number(&ds.extra, "tension")
        .or(opts.tension)
        .unwrap_or(0.0);
    if let Some(radius) = number(&ds.extra, "pointRadius") {
        series.point_radius = radius;
    }
    series.hidden = ds.extra.get("hidden").and_then(Value::as_bool).unwrap_or(false);
    series
}

fn number(map: &serde_json::Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key).and_then(Value::as_f64)
}
