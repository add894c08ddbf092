use super::{format_value, smooth, AxisScale, Panel, Series, SeriesStyle, FONT};
use anyhow::{Context, Result};
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::collections::HashMap;

/// Share of a category slot (or of the smallest x spacing) that a bar group fills.
const GROUP_WIDTH: f64 = 0.8;
/// Largest magnitude an axis end may take. Wider data is clamped so tick generation
/// always sees a finite span.
const MAX_EXTENT: f64 = 1e300;

// =============================================================================
// Scales
// =============================================================================

/// Maps data values onto chart coordinates. Log axes plot `log10` of the value and
/// cannot show values at or below zero.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Scale {
    log: bool,
}

impl Scale {
    fn of(scale: AxisScale) -> Self {
        Self {
            log: scale == AxisScale::Log,
        }
    }

    fn to_coord(self, v: f64) -> Option<f64> {
        if !v.is_finite() {
            return None;
        }
        if self.log {
            (v > 0.0).then(|| v.log10())
        } else {
            Some(v)
        }
    }

    fn to_value(self, c: f64) -> f64 {
        if self.log {
            10f64.powf(c)
        } else {
            c
        }
    }
}

fn pad_range(min: f64, max: f64) -> (f64, f64) {
    let (min, max) = (clamp_extent(min), clamp_extent(max));
    if min == max {
        let padding = (min.abs() * 0.05).max(1.0);
        (min - padding, max + padding)
    } else {
        let padding = (max - min) * 0.05;
        (min - padding, max + padding)
    }
}

fn clamp_extent(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(-MAX_EXTENT, MAX_EXTENT)
    }
}

/// Finite axis range with a non-zero span.
fn bounded((lo, hi): (f64, f64)) -> (f64, f64) {
    let (lo, hi) = (clamp_extent(lo), clamp_extent(hi));
    if lo < hi {
        (lo, hi)
    } else {
        pad_range(lo, lo)
    }
}

/// Marker radius in pixels, at most the diagonal of the drawing area.
fn marker_radius(r: f64, (width, height): (u32, u32)) -> i32 {
    if r.is_nan() {
        return 0;
    }
    let limit = (width as f64).hypot(height as f64);
    r.clamp(0.0, limit).round() as i32
}

// =============================================================================
// Layout
// =============================================================================

/// One drawable datum. `pos` is already an index-axis coordinate; `base` and `top`
/// are values on the value axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Mark {
    index: usize,
    pos: f64,
    base: f64,
    top: f64,
    value: f64,
    r: Option<f64>,
}

#[derive(Debug)]
struct Placed<'a> {
    series: &'a Series,
    marks: Vec<Mark>,
    /// Bar offset from the slot center and bar width, in index-axis units.
    bar: Option<(f64, f64)>,
}

#[derive(Debug)]
struct Layout<'a> {
    index_scale: Scale,
    value_scale: Scale,
    /// Number of category slots; zero for continuous index axes.
    slots: usize,
    index_range: (f64, f64),
    value_range: (f64, f64),
    placed: Vec<Placed<'a>>,
}

impl<'a> Layout<'a> {
    fn new(panel: &'a Panel) -> Self {
        let index_scale = Scale::of(panel.x_axis.scale);
        let value_scale = Scale::of(panel.y_axis.scale);
        let category = panel.x_axis.scale == AxisScale::Category;
        let stacked = panel.y_axis.stacked;
        let visible: Vec<&Series> = panel.series.iter().filter(|s| !s.hidden).collect();

        let slots = if category {
            let longest = visible.iter().map(|s| s.points.len()).max().unwrap_or(0);
            panel.labels.len().max(longest).max(1)
        } else {
            0
        };

        let position = |i: usize, x: Option<f64>| -> Option<f64> {
            if category {
                let slot = if panel.horizontal { slots - 1 - i } else { i };
                Some(slot as f64)
            } else {
                index_scale.to_coord(x.unwrap_or(i as f64))
            }
        };

        // Stacks are keyed by index position and split by sign.
        let mut stacks: HashMap<u64, (f64, f64)> = HashMap::new();
        let mut placed: Vec<Placed<'a>> = Vec::with_capacity(visible.len());
        for series in visible.iter().copied() {
            let mut marks = Vec::with_capacity(series.points.len());
            for (i, point) in series.points.iter().enumerate() {
                if category && i >= slots {
                    continue;
                }
                let Some(pos) = position(i, point.x) else {
                    continue;
                };
                if !point.y.is_finite() {
                    continue;
                }
                let (base, top) = if stacked {
                    let entry = stacks.entry(pos.to_bits()).or_insert((0.0, 0.0));
                    let sum = if point.y >= 0.0 { &mut entry.0 } else { &mut entry.1 };
                    let base = *sum;
                    *sum += point.y;
                    (base, *sum)
                } else {
                    (0.0, point.y)
                };
                if value_scale.to_coord(top).is_none() {
                    continue;
                }
                marks.push(Mark {
                    index: i,
                    pos,
                    base,
                    top,
                    value: point.y,
                    r: point.r,
                });
            }
            placed.push(Placed {
                series,
                marks,
                bar: None,
            });
        }

        // Bar geometry: dodge side by side unless stacked.
        let spacing = if category {
            1.0
        } else {
            min_spacing(
                placed
                    .iter()
                    .filter(|p| p.series.style == SeriesStyle::Bar)
                    .flat_map(|p| p.marks.iter().map(|m| m.pos)),
            )
        };
        let bar_count = placed
            .iter()
            .filter(|p| p.series.style == SeriesStyle::Bar)
            .count();
        let lanes = if stacked { 1 } else { bar_count.max(1) };
        let width = spacing * GROUP_WIDTH / lanes as f64;
        let mut rank = 0;
        for p in placed.iter_mut() {
            if p.series.style != SeriesStyle::Bar {
                continue;
            }
            let offset = if stacked {
                0.0
            } else {
                (rank as f64 - (lanes as f64 - 1.0) / 2.0) * width
            };
            p.bar = Some((offset, width));
            rank += 1;
        }

        let index_range = if category {
            (-0.5, slots as f64 - 0.5)
        } else {
            let positions = placed.iter().flat_map(|p| p.marks.iter().map(|m| m.pos));
            match min_max(positions) {
                Some((lo, hi)) if bar_count > 0 => {
                    let half = spacing * GROUP_WIDTH / 2.0;
                    (lo - half, hi + half)
                }
                Some((lo, hi)) => pad_range(lo, hi),
                None => (0.0, 1.0),
            }
        };

        let value_range = value_extent(panel, &placed, value_scale);

        Self {
            index_scale,
            value_scale,
            slots,
            index_range: bounded(index_range),
            value_range: bounded(value_range),
            placed,
        }
    }

    /// Value-axis coordinate of a mark's baseline.
    fn base_coord(&self, mark: &Mark) -> f64 {
        self.value_scale
            .to_coord(mark.base)
            .unwrap_or(self.value_range.0)
            .clamp(self.value_range.0, self.value_range.1)
    }

    fn top_coord(&self, mark: &Mark) -> f64 {
        self.value_scale
            .to_coord(mark.top)
            .unwrap_or(self.value_range.0)
    }
}

fn value_extent(panel: &Panel, placed: &[Placed<'_>], scale: Scale) -> (f64, f64) {
    let mut coords: Vec<f64> = Vec::new();
    for p in placed {
        for m in &p.marks {
            coords.extend(scale.to_coord(m.top));
            if panel.y_axis.stacked {
                coords.extend(scale.to_coord(m.base));
            }
        }
    }

    let Some((lo, hi)) = min_max(coords.into_iter()) else {
        return (0.0, 1.0);
    };

    let anchor_zero = !scale.log
        && (panel.y_axis.begin_at_zero
            || panel.y_axis.stacked
            || placed
                .iter()
                .any(|p| matches!(p.series.style, SeriesStyle::Bar | SeriesStyle::Area)));

    if !anchor_zero {
        return pad_range(lo, hi);
    }
    let (lo, hi) = (lo.min(0.0), hi.max(0.0));
    let (mut padded_lo, mut padded_hi) = pad_range(lo, hi);
    if lo >= 0.0 {
        padded_lo = 0.0;
    }
    if hi <= 0.0 {
        padded_hi = 0.0;
    }
    (padded_lo, padded_hi)
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

/// Smallest gap between distinct positions, or 1 when there are fewer than two.
fn min_spacing(positions: impl Iterator<Item = f64>) -> f64 {
    let mut sorted: Vec<f64> = positions.collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup();
    sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|gap| *gap > 0.0)
        .fold(None, |acc: Option<f64>, gap| Some(acc.map_or(gap, |a| a.min(gap))))
        .unwrap_or(1.0)
        .min(MAX_EXTENT)
}

// =============================================================================
// Drawing
// =============================================================================

pub(super) fn draw<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, panel: &Panel) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let layout = Layout::new(panel);
    let horizontal = panel.horizontal;
    let bounds = area.dim_in_pixel();

    // (index, value) -> chart (x, y)
    let at = |pos: f64, value: f64| -> (f64, f64) {
        if horizontal {
            (value, pos)
        } else {
            (pos, value)
        }
    };

    let (ix, vx) = (layout.index_range, layout.value_range);
    let (x_range, y_range) = if horizontal { (vx, ix) } else { (ix, vx) };

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(if horizontal { 80 } else { 50 })
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
        .context("Failed to build chart")?;

    let labels = &panel.labels;
    let slots = layout.slots;
    let index_scale = layout.index_scale;
    let value_scale = layout.value_scale;
    let index_fmt = |c: &f64| -> String {
        if slots == 0 {
            return format_value(index_scale.to_value(*c));
        }
        let r = c.round();
        if (c - r).abs() > 1e-6 || r < 0.0 || r as usize >= slots {
            return String::new();
        }
        let slot = r as usize;
        let i = if horizontal { slots - 1 - slot } else { slot };
        labels.get(i).cloned().unwrap_or_default()
    };
    let value_fmt = |c: &f64| format_value(value_scale.to_value(*c));
    let index_ticks = if slots > 0 { slots } else { 10 };

    let index_title = panel.x_axis.title.as_deref();
    let value_title = panel.y_axis.title.as_deref();

    {
        let mut mesh = chart.configure_mesh();
        mesh.label_style((FONT, 12.0)).axis_desc_style((FONT, 13.0));
        if horizontal {
            mesh.x_label_formatter(&value_fmt)
                .y_label_formatter(&index_fmt)
                .y_labels(index_ticks);
            if let Some(t) = value_title {
                mesh.x_desc(t);
            }
            if let Some(t) = index_title {
                mesh.y_desc(t);
            }
        } else {
            mesh.x_label_formatter(&index_fmt)
                .y_label_formatter(&value_fmt)
                .x_labels(index_ticks);
            if let Some(t) = index_title {
                mesh.x_desc(t);
            }
            if let Some(t) = value_title {
                mesh.y_desc(t);
            }
        }
        mesh.draw().context("Failed to draw mesh")?;
    }

    for placed in &layout.placed {
        let series = placed.series;
        let stroke = series.stroke();

        match series.style {
            SeriesStyle::Bar => {
                let (offset, width) = placed.bar.unwrap_or((0.0, GROUP_WIDTH));
                for mark in &placed.marks {
                    let center = mark.pos + offset;
                    let corners = [
                        at(center - width / 2.0, layout.base_coord(mark)),
                        at(center + width / 2.0, layout.top_coord(mark)),
                    ];
                    chart
                        .draw_series(std::iter::once(Rectangle::new(
                            corners,
                            series.fill_at(mark.index).filled(),
                        )))
                        .context("Failed to draw bar")?;
                    if stroke > 0 {
                        chart
                            .draw_series(std::iter::once(Rectangle::new(
                                corners,
                                series.border_at(mark.index).stroke_width(stroke),
                            )))
                            .context("Failed to draw bar border")?;
                    }
                }
            }
            SeriesStyle::Line | SeriesStyle::Area => {
                let path: Vec<(f64, f64)> = placed
                    .marks
                    .iter()
                    .map(|m| (m.pos, layout.top_coord(m)))
                    .collect();
                let curve = smooth(&path, series.tension);

                if series.style == SeriesStyle::Area && !curve.is_empty() {
                    let mut outline: Vec<(f64, f64)> =
                        curve.iter().map(|&(p, v)| at(p, v)).collect();
                    outline.extend(
                        placed
                            .marks
                            .iter()
                            .rev()
                            .map(|m| at(m.pos, layout.base_coord(m))),
                    );
                    chart
                        .draw_series(std::iter::once(Polygon::new(
                            outline,
                            series.fill_at(0).filled(),
                        )))
                        .context("Failed to draw area")?;
                }

                chart
                    .draw_series(LineSeries::new(
                        curve.into_iter().map(|(p, v)| at(p, v)),
                        series.border_at(0).stroke_width(stroke.max(1)),
                    ))
                    .context("Failed to draw line series")?;

                let radius = marker_radius(series.point_radius, bounds);
                draw_points(&mut chart, placed, &layout, &at, radius)?;
            }
            SeriesStyle::Point => {
                let radius = marker_radius(series.point_radius.max(1.0), bounds);
                draw_points(&mut chart, placed, &layout, &at, radius)?;
            }
            SeriesStyle::Bubble => {
                for mark in &placed.marks {
                    let radius = marker_radius(mark.r.unwrap_or(series.point_radius), bounds);
                    let center = at(mark.pos, layout.top_coord(mark));
                    chart
                        .draw_series(std::iter::once(Circle::new(
                            center,
                            radius,
                            series.fill_at(mark.index).filled(),
                        )))
                        .context("Failed to draw bubble")?;
                    if stroke > 0 {
                        chart
                            .draw_series(std::iter::once(Circle::new(
                                center,
                                radius,
                                series.border_at(mark.index).stroke_width(stroke),
                            )))
                            .context("Failed to draw bubble border")?;
                    }
                }
            }
        }

        if panel.data_labels {
            let offset = if horizontal { (6, -6) } else { (-6, -16) };
            chart
                .draw_series(placed.marks.iter().map(|mark| {
                    let anchor = match placed.bar {
                        Some((shift, _)) => at(mark.pos + shift, layout.top_coord(mark)),
                        None => at(mark.pos, layout.top_coord(mark)),
                    };
                    EmptyElement::at(anchor)
                        + Text::new(format_value(mark.value), offset, (FONT, 11.0).into_font())
                }))
                .context("Failed to draw data labels")?;
        }
    }

    Ok(())
}

fn draw_points<DB, F>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    placed: &Placed<'_>,
    layout: &Layout<'_>,
    at: &F,
    radius: i32,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
    F: Fn(f64, f64) -> (f64, f64),
{
    if radius <= 0 {
        return Ok(());
    }
    let series = placed.series;
    for mark in &placed.marks {
        let center = at(mark.pos, layout.top_coord(mark));
        chart
            .draw_series(std::iter::once(Circle::new(
                center,
                radius,
                series.fill_at(mark.index).filled(),
            )))
            .context("Failed to draw point")?;
        chart
            .draw_series(std::iter::once(Circle::new(
                center,
                radius,
                series.border_at(mark.index).stroke_width(series.stroke().max(1)),
            )))
            .context("Failed to draw point border")?;
    }
    Ok(())
}
