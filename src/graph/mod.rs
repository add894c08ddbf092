//! Canvas engine: a `Figure` of one or more chart panels drawn with plotters.
//!
//! Both request dialects lower into this model. PNG output goes through an RGB bitmap
//! buffer and the `image` PNG encoder; SVG output is produced by plotters' SVG backend.

mod cartesian;
mod legend;
mod radial;

use crate::chart::ColorValue;
use crate::color::{color_or, parse_color, FALLBACK_COLOR};
use anyhow::{Context, Result};
use image::ImageEncoder;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontStyle;

pub(crate) const FONT: &str = "sans-serif";

// =============================================================================
// Figure model
// =============================================================================

/// A whole image: optional title block and a grid of panels.
#[derive(Debug, Clone)]
pub struct Figure {
    pub width: u32,
    pub height: u32,
    pub background: String,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    /// Grid columns used when there is more than one panel.
    pub columns: usize,
    pub panels: Vec<Panel>,
}

impl Figure {
    pub fn single(width: u32, height: u32, background: &str, panel: Panel) -> Self {
        Self {
            width,
            height,
            background: background.to_string(),
            title: None,
            subtitle: None,
            columns: 1,
            panels: vec![panel],
        }
    }

    /// (rows, columns) of the panel grid.
    pub fn grid(&self) -> (usize, usize) {
        let n = self.panels.len().max(1);
        let cols = self.columns.clamp(1, n);
        let rows = n.div_ceil(cols);
        (rows, cols)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelKind {
    Cartesian,
    Pie,
    Doughnut,
    PolarArea,
    Radar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisScale {
    /// One slot per label; points are placed by index.
    Category,
    Linear,
    Log,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub title: Option<String>,
    pub scale: AxisScale,
    pub stacked: bool,
    pub begin_at_zero: bool,
}

impl Axis {
    pub fn category() -> Self {
        Self {
            title: None,
            scale: AxisScale::Category,
            stacked: false,
            begin_at_zero: false,
        }
    }

    pub fn linear() -> Self {
        Self {
            scale: AxisScale::Linear,
            ..Self::category()
        }
    }
}

/// One chart cell. For cartesian panels `x_axis` is the index axis and `y_axis` the value
/// axis; `horizontal` swaps where they are drawn.
#[derive(Debug, Clone)]
pub struct Panel {
    pub kind: PanelKind,
    pub title: Option<String>,
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    pub x_axis: Axis,
    pub y_axis: Axis,
    pub horizontal: bool,
    pub show_legend: bool,
    pub data_labels: bool,
}

impl Panel {
    pub fn new(kind: PanelKind) -> Self {
        Self {
            kind,
            title: None,
            labels: Vec::new(),
            series: Vec::new(),
            x_axis: Axis::category(),
            y_axis: Axis::linear(),
            horizontal: false,
            show_legend: true,
            data_labels: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesStyle {
    Bar,
    Line,
    Area,
    Point,
    Bubble,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub x: Option<f64>,
    pub y: f64,
    pub r: Option<f64>,
}

impl SeriesPoint {
    pub fn value(y: f64) -> Self {
        Self { x: None, y, r: None }
    }

    pub fn xy(x: f64, y: f64) -> Self {
        Self { x: Some(x), y, r: None }
    }
}

#[derive(Debug, Clone)]
pub struct Series {
    pub label: Option<String>,
    pub style: SeriesStyle,
    pub points: Vec<SeriesPoint>,
    pub fill: Option<ColorValue>,
    pub border: Option<ColorValue>,
    pub border_width: f64,
    /// Curve smoothing; 0 draws straight segments.
    pub tension: f64,
    pub point_radius: f64,
    pub hidden: bool,
}

impl Series {
    pub fn new(style: SeriesStyle, points: Vec<SeriesPoint>) -> Self {
        Self {
            label: None,
            style,
            points,
            fill: None,
            border: None,
            border_width: 1.0,
            tension: 0.0,
            point_radius: 3.0,
            hidden: false,
        }
    }

    pub(crate) fn fill_at(&self, index: usize) -> RGBAColor {
        color_or(self.fill.as_ref().and_then(|c| c.at(index)), FALLBACK_COLOR)
    }

    /// Border color, falling back to the fill color.
    pub(crate) fn border_at(&self, index: usize) -> RGBAColor {
        match self.border.as_ref().and_then(|c| c.at(index)).and_then(parse_color) {
            Some(c) => c,
            None => self.fill_at(index),
        }
    }

    pub(crate) fn stroke(&self) -> u32 {
        self.border_width.max(0.0).round() as u32
    }
}

// =============================================================================
// Entry points
// =============================================================================

/// Render a figure to PNG bytes.
pub fn render_png(figure: &Figure) -> Result<Vec<u8>> {
    let (width, height) = (figure.width, figure.height);
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        draw_figure(&root, figure)?;
        root.present().context("Failed to present drawing")?;
    }

    let mut png_bytes = Vec::new();
    {
        let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
        encoder
            .write_image(&buffer, width, height, image::ColorType::Rgb8)
            .context("Failed to encode PNG")?;
    }

    Ok(png_bytes)
}

/// Render a figure to an SVG document.
pub fn render_svg(figure: &Figure) -> Result<String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (figure.width, figure.height))
            .into_drawing_area();
        draw_figure(&root, figure)?;
        root.present().context("Failed to present drawing")?;
    }
    Ok(svg)
}

fn draw_figure<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, figure: &Figure) -> Result<()>
where
    DB::ErrorType: 'static,
{
    // Translucent backgrounds are composited over white.
    let background = color_or(Some(figure.background.as_str()), WHITE.to_rgba());
    if background.3 < 1.0 {
        root.fill(&WHITE).context("Failed to fill background")?;
    }
    root.fill(&background).context("Failed to fill background")?;

    let mut area = root.clone();
    if let Some(title) = &figure.title {
        let style = (FONT, 22.0).into_font().style(FontStyle::Bold);
        area = area.titled(title, style).context("Failed to draw title")?;
    }
    if let Some(subtitle) = &figure.subtitle {
        area = area
            .titled(subtitle, (FONT, 15.0))
            .context("Failed to draw subtitle")?;
    }

    let cells = area.split_evenly(figure.grid());
    for (panel, cell) in figure.panels.iter().zip(cells.iter()) {
        draw_panel(cell, panel)?;
    }

    Ok(())
}

fn draw_panel<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, panel: &Panel) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let mut area = area.clone();
    if let Some(title) = &panel.title {
        area = area
            .titled(title, (FONT, 16.0))
            .context("Failed to draw panel title")?;
    }

    let area = if panel.show_legend {
        legend::draw_legend(&area, panel)?
    } else {
        area
    };

    match panel.kind {
        PanelKind::Cartesian => cartesian::draw(&area, panel),
        PanelKind::Pie | PanelKind::Doughnut | PanelKind::PolarArea => {
            radial::draw_segments(&area, panel)
        }
        PanelKind::Radar => radial::draw_radar(&area, panel),
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Format a value for ticks and data labels: integers without a fraction, others
/// with at most two decimals.
pub(crate) fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else if v.is_finite() && v.abs() >= 1e15 {
        format!("{:.2e}", v)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Catmull-Rom interpolation through `points`; `tension` of 0 returns the input.
pub(crate) fn smooth(points: &[(f64, f64)], tension: f64) -> Vec<(f64, f64)> {
    if tension <= 0.0 || points.len() < 3 {
        return points.to_vec();
    }
    const STEPS: usize = 12;
    let t = tension.min(1.0);
    let mut out = Vec::with_capacity(points.len() * STEPS);
    for i in 0..points.len() - 1 {
        let p0 = points[i.saturating_sub(1)];
        let p1 = points[i];
        let p2 = points[i + 1];
        let p3 = points[(i + 2).min(points.len() - 1)];
        // Tangents scaled by tension.
        let m1 = ((p2.0 - p0.0) * t, (p2.1 - p0.1) * t);
        let m2 = ((p3.0 - p1.0) * t, (p3.1 - p1.1) * t);
        for step in 0..STEPS {
            let s = step as f64 / STEPS as f64;
            let (s2, s3) = (s * s, s * s * s);
            let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
            let h10 = s3 - 2.0 * s2 + s;
            let h01 = -2.0 * s3 + 3.0 * s2;
            let h11 = s3 - s2;
            out.push((
                h00 * p1.0 + h10 * m1.0 + h01 * p2.0 + h11 * m2.0,
                h00 * p1.1 + h10 * m1.1 + h01 * p2.1 + h11 * m2.1,
            ));
        }
    }
    if let Some(last) = points.last() {
        out.push(*last);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

    fn bar_panel() -> Panel {
        let mut panel = Panel::new(PanelKind::Cartesian);
        panel.labels = vec!["A".into(), "B".into(), "C".into()];
        let mut series = Series::new(
            SeriesStyle::Bar,
            [10.0, 20.0, 30.0].iter().map(|&v| SeriesPoint::value(v)).collect(),
        );
        series.label = Some("Test".into());
        series.fill = Some(ColorValue::Single("rgba(54, 162, 235, 0.8)".into()));
        panel.series.push(series);
        panel
    }

    fn pie_panel(kind: PanelKind) -> Panel {
        let mut panel = Panel::new(kind);
        panel.labels = vec!["X".into(), "Y".into(), "Z".into()];
        let mut series = Series::new(
            SeriesStyle::Bar,
            [60.0, 30.0, 10.0].iter().map(|&v| SeriesPoint::value(v)).collect(),
        );
        series.fill = Some(ColorValue::Many(vec!["red".into(), "green".into()]));
        panel.series.push(series);
        panel
    }

    #[test]
    fn test_render_png_signature() {
        let figure = Figure::single(320, 240, "white", bar_panel());
        let png = render_png(&figure).unwrap();
        assert!(png.len() > 8);
        assert_eq!(&png[0..8], &PNG_SIGNATURE);
    }

    #[test]
    fn test_render_svg_document() {
        let mut figure = Figure::single(320, 240, "#f0f0f0", bar_panel());
        figure.title = Some("Sales".into());
        figure.subtitle = Some("2024".into());
        let svg = render_svg(&figure).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_render_radial_kinds() {
        for kind in [
            PanelKind::Pie,
            PanelKind::Doughnut,
            PanelKind::PolarArea,
            PanelKind::Radar,
        ] {
            let figure = Figure::single(300, 300, "white", pie_panel(kind));
            let svg = render_svg(&figure).unwrap();
            assert!(svg.contains("<svg"), "{:?}", kind);
        }
    }

    #[test]
    fn test_render_grid_of_panels() {
        let mut figure = Figure::single(600, 300, "white", bar_panel());
        figure.panels.push(pie_panel(PanelKind::Pie));
        figure.panels.push(bar_panel());
        figure.columns = 2;
        assert_eq!(figure.grid(), (2, 2));
        assert!(render_png(&figure).is_ok());
    }

    #[test]
    fn test_grid_dimensions() {
        let mut figure = Figure::single(100, 100, "white", bar_panel());
        assert_eq!(figure.grid(), (1, 1));
        figure.panels = vec![bar_panel(); 3];
        figure.columns = 3;
        assert_eq!(figure.grid(), (1, 3));
        figure.columns = 1;
        assert_eq!(figure.grid(), (3, 1));
        figure.columns = 10;
        assert_eq!(figure.grid(), (1, 3));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(10.0), "10");
        assert_eq!(format_value(-3.0), "-3");
        assert_eq!(format_value(2.5), "2.5");
        assert_eq!(format_value(1.0 / 3.0), "0.33");
        assert_eq!(format_value(1e300), "1.00e300");
    }

    #[test]
    fn test_smooth_keeps_endpoints() {
        let points = vec![(0.0, 0.0), (1.0, 2.0), (2.0, 0.0)];
        assert_eq!(smooth(&points, 0.0), points);
        let curve = smooth(&points, 0.4);
        assert!(curve.len() > points.len());
        assert_eq!(curve.first(), Some(&(0.0, 0.0)));
        assert_eq!(curve.last(), Some(&(2.0, 0.0)));
    }

    #[test]
    fn test_series_colors_fall_back() {
        let mut series = Series::new(SeriesStyle::Bar, vec![SeriesPoint::value(1.0)]);
        assert_eq!(series.fill_at(0).3, 0.1);
        series.fill = Some(ColorValue::Many(vec!["red".into()]));
        assert_eq!(series.fill_at(0).0, 255);
        assert_eq!(series.fill_at(1).3, 0.1);
        assert_eq!(series.border_at(0).0, 255);
    }
}
