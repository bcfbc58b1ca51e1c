//! PNG chart rendering with plotters
//!
//! The x-axis is categorical: row `i` sits at `x = i`, so non-trading gaps
//! are not drawn. Only the requested tick positions carry labels.

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use std::fmt::Display;

use crate::chart::{ChartKind, ChartRenderer, RenderRequest};
use crate::error::RenderError;
use crate::types::{Candle, PriceField};

const MARGIN: u32 = 20;
const X_LABEL_AREA: u32 = 50;
const Y_LABEL_AREA: u32 = 70;

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Bitmap renderer writing PNG files
#[derive(Debug, Clone, Copy)]
pub struct PlottersRenderer {
    width: u32,
    height: u32,
}

impl PlottersRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for PlottersRenderer {
    fn default() -> Self {
        Self::new(1200, 700)
    }
}

impl ChartRenderer for PlottersRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<(), RenderError> {
        let candles = request.window.candles();
        if candles.is_empty() {
            return Err(RenderError::InvalidData("empty window".to_string()));
        }
        if request.ticks.positions.len() != request.ticks.labels.len() {
            return Err(RenderError::InvalidData(format!(
                "{} tick positions but {} labels",
                request.ticks.positions.len(),
                request.ticks.labels.len()
            )));
        }
        if let Some(&pos) = request.ticks.positions.iter().find(|&&p| p >= candles.len()) {
            return Err(RenderError::InvalidData(format!(
                "tick position {} outside window of {} rows",
                pos,
                candles.len()
            )));
        }

        if let Some(parent) = request.output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let root = BitMapBackend::new(request.output_path, (self.width, self.height))
            .into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let bar_width = self.bar_width(candles.len());
        match request.kind {
            ChartKind::Candlestick => draw_candlestick(&root, request, bar_width)?,
            ChartKind::Line => draw_line(&root, request)?,
            ChartKind::Barline => draw_bar_line(&root, request)?,
        }

        root.present().map_err(draw_err)?;
        Ok(())
    }
}

impl PlottersRenderer {
    fn bar_width(&self, rows: usize) -> u32 {
        let plot_width = self.width.saturating_sub(2 * MARGIN + Y_LABEL_AREA) as f64;
        ((plot_width / rows.max(1) as f64) * 0.7).max(1.0) as u32
    }
}

fn draw_err(err: impl Display) -> RenderError {
    RenderError::Draw(err.to_string())
}

fn x_range(rows: usize) -> std::ops::Range<f64> {
    -0.5..(rows as f64 - 0.5)
}

/// Pad a value range so flat series still get a visible axis
fn padded(lo: f64, hi: f64) -> std::ops::Range<f64> {
    let span = hi - lo;
    let pad = if span.abs() < f64::EPSILON {
        lo.abs().max(1.0) * 0.01
    } else {
        span * 0.05
    };
    (lo - pad)..(hi + pad)
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn draw_candlestick(root: &Area<'_>, request: &RenderRequest<'_>, bar_width: u32) -> Result<(), RenderError> {
    let candles = request.window.candles();
    let (lo, hi) = bounds(candles.iter().flat_map(|c| [c.low, c.high]));
    let y_range = padded(lo, hi);
    let y_floor = y_range.start;

    let mut chart = ChartBuilder::on(root)
        .margin(MARGIN)
        .x_label_area_size(X_LABEL_AREA)
        .y_label_area_size(Y_LABEL_AREA)
        .build_cartesian_2d(x_range(candles.len()), y_range)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .y_desc(request.y_axis_title.as_str())
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series(candles.iter().enumerate().map(|(i, c)| {
            CandleStick::new(
                i as f64,
                c.open,
                c.high,
                c.low,
                c.close,
                GREEN.filled(),
                RED.filled(),
                bar_width,
            )
        }))
        .map_err(draw_err)?;

    let anchors: Vec<(i32, i32)> = request
        .ticks
        .positions
        .iter()
        .map(|&p| chart.backend_coord(&(p as f64, y_floor)))
        .collect();
    draw_ticks(root, &anchors, &request.ticks.labels)
}

fn draw_line(root: &Area<'_>, request: &RenderRequest<'_>) -> Result<(), RenderError> {
    let candles = request.window.candles();
    let field = request.price_field.unwrap_or(PriceField::Close);
    let (lo, hi) = bounds(candles.iter().map(|c| c.price(field)));
    let y_range = padded(lo, hi);
    let y_floor = y_range.start;

    let mut builder = ChartBuilder::on(root);
    builder
        .margin(MARGIN)
        .x_label_area_size(X_LABEL_AREA)
        .y_label_area_size(Y_LABEL_AREA);
    if let Some(title) = request.title() {
        builder.caption(title, ("sans-serif", 22));
    }
    let mut chart = builder
        .build_cartesian_2d(x_range(candles.len()), y_range)
        .map_err(draw_err)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .y_desc(request.y_axis_title.as_str())
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series(LineSeries::new(
            candles
                .iter()
                .enumerate()
                .map(|(i, c): (usize, &Candle)| (i as f64, c.price(field))),
            &BLUE,
        ))
        .map_err(draw_err)?;

    let anchors: Vec<(i32, i32)> = request
        .ticks
        .positions
        .iter()
        .map(|&p| chart.backend_coord(&(p as f64, y_floor)))
        .collect();
    draw_ticks(root, &anchors, &request.ticks.labels)
}

/// Volume bars on the primary axis, close line on the secondary axis
fn draw_bar_line(root: &Area<'_>, request: &RenderRequest<'_>) -> Result<(), RenderError> {
    let candles = request.window.candles();
    let (_, max_volume) = bounds(candles.iter().map(|c| c.volume));
    let (close_lo, close_hi) = bounds(candles.iter().map(|c| c.close));
    let volume_range = 0.0..(max_volume.max(1.0) * 1.1);

    let mut chart = ChartBuilder::on(root)
        .margin(MARGIN)
        .x_label_area_size(X_LABEL_AREA)
        .y_label_area_size(Y_LABEL_AREA)
        .right_y_label_area_size(Y_LABEL_AREA)
        .build_cartesian_2d(x_range(candles.len()), volume_range)
        .map_err(draw_err)?
        .set_secondary_coord(x_range(candles.len()), padded(close_lo, close_hi));

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .y_desc(request.y_axis_title.as_str())
        .draw()
        .map_err(draw_err)?;
    chart
        .configure_secondary_axes()
        .y_desc("Close")
        .draw()
        .map_err(draw_err)?;

    chart
        .draw_series(candles.iter().enumerate().map(|(i, c)| {
            let x = i as f64;
            Rectangle::new([(x - 0.4, 0.0), (x + 0.4, c.volume)], BLUE.mix(0.5).filled())
        }))
        .map_err(draw_err)?;
    chart
        .draw_secondary_series(LineSeries::new(
            candles.iter().enumerate().map(|(i, c)| (i as f64, c.close)),
            &RED,
        ))
        .map_err(draw_err)?;

    let anchors: Vec<(i32, i32)> = request
        .ticks
        .positions
        .iter()
        .map(|&p| chart.backend_coord(&(p as f64, 0.0)))
        .collect();
    draw_ticks(root, &anchors, &request.ticks.labels)
}

/// Tick marks and labels hung below the plot at pixel anchors
fn draw_ticks(root: &Area<'_>, anchors: &[(i32, i32)], labels: &[String]) -> Result<(), RenderError> {
    let style = ("sans-serif", 14)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Top));

    for (&(x, y), label) in anchors.iter().zip(labels) {
        root.draw(&PathElement::new(vec![(x, y), (x, y + 5)], BLACK))
            .map_err(draw_err)?;
        root.draw(&Text::new(label.clone(), (x, y + 8), style.clone()))
            .map_err(draw_err)?;
    }
    Ok(())
}
