//! Cartesian charts: scatter of two metrics and category bar totals.

use plotters::coord::Shift;
use plotters::prelude::*;

use super::{backend_err, FONT};
use crate::error::RenderError;

/// Points sharing a hue
pub struct PointGroup {
    pub label: String,
    pub color: RGBColor,
    pub points: Vec<(f64, f64)>,
}

pub struct ScatterAxes<'a> {
    pub x_desc: &'a str,
    pub y_desc: &'a str,
    pub log_y: bool,
}

pub fn draw_scatter<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    groups: &[PointGroup],
    axes: &ScatterAxes<'_>,
) -> Result<(), RenderError> {
    let all = || groups.iter().flat_map(|g| g.points.iter());
    let (x_range, y_range) = match (
        padded_range(all().map(|p| p.0)),
        padded_range(all().map(|p| p.1)),
    ) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(RenderError::NoData(axes.y_desc.to_string())),
    };

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(90)
        .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
        .map_err(backend_err)?;

    let log_y = axes.log_y;
    let y_format = move |v: &f64| {
        if log_y {
            format_quantity(10f64.powf(*v))
        } else {
            format_quantity(*v)
        }
    };
    let x_format = |v: &f64| format_quantity(*v);
    chart
        .configure_mesh()
        .x_desc(axes.x_desc)
        .y_desc(axes.y_desc)
        .x_label_formatter(&x_format)
        .y_label_formatter(&y_format)
        .label_style((FONT, 14))
        .draw()
        .map_err(backend_err)?;

    for group in groups {
        let color = group.color;
        chart
            .draw_series(
                group
                    .points
                    .iter()
                    .map(|&(x, y)| Circle::new((x, y), 3, color.mix(0.6).filled())),
            )
            .map_err(backend_err)?
            .label(group.label.clone())
            .legend(move |(x, y)| Circle::new((x, y), 5, color.filled()));
    }

    if groups.len() > 1 {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .label_font((FONT, 14))
            .draw()
            .map_err(backend_err)?;
    }
    Ok(())
}

/// One bar
pub struct Bar {
    pub label: String,
    pub value: f64,
    pub share: Option<f64>,
    pub color: RGBColor,
}

pub fn draw_bars<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    bars: &[Bar],
    y_desc: &str,
) -> Result<(), RenderError> {
    if bars.is_empty() {
        return Err(RenderError::NoData(y_desc.to_string()));
    }

    let top = bars.iter().map(|b| b.value).fold(0.0, f64::max);
    let y_max = if top > 0.0 { top * 1.15 } else { 1.0 };
    let n = bars.len() as f64;

    let mut chart = ChartBuilder::on(area)
        .margin(20)
        .x_label_area_size(20)
        .y_label_area_size(90)
        .build_cartesian_2d(0f64..n, 0f64..y_max)
        .map_err(backend_err)?;

    let y_format = |v: &f64| format_quantity(*v);
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|_| String::new())
        .y_desc(y_desc)
        .y_label_formatter(&y_format)
        .label_style((FONT, 14))
        .draw()
        .map_err(backend_err)?;

    chart
        .draw_series(bars.iter().enumerate().map(|(i, bar)| {
            let left = i as f64 + 0.15;
            Rectangle::new([(left, 0.0), (left + 0.7, bar.value)], bar.color.filled())
        }))
        .map_err(backend_err)?;

    chart
        .draw_series(bars.iter().enumerate().map(|(i, bar)| {
            let caption = match bar.share {
                Some(share) => format!("{} ({:.1}%)", bar.label, share * 100.0),
                None => bar.label.clone(),
            };
            Text::new(caption, (i as f64 + 0.15, bar.value + y_max * 0.03), (FONT, 15))
        }))
        .map_err(backend_err)?;

    Ok(())
}

/// Axis range with 5% padding on each side; `None` without finite values.
fn padded_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;
    let pad = if max > min { (max - min) * 0.05 } else { min.abs().max(1.0) * 0.05 };
    Some((min - pad, max + pad))
}

/// Compact tick label: 1.2B, 35M, 48K, 0.42.
pub fn format_quantity(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1e9 {
        format!("{:.1}B", value / 1e9)
    } else if magnitude >= 1e6 {
        format!("{:.0}M", value / 1e6)
    } else if magnitude >= 1e3 {
        format!("{:.0}K", value / 1e3)
    } else if magnitude >= 10.0 || magnitude == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
