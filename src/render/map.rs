//! County choropleth drawing: projection, canvas fitting, fill and legend.

use geo::{Area, BoundingRect, Coord, LineString, MapCoords, MultiPolygon, Polygon as Shape, Rect};
use plotters::coord::Shift;
use plotters::prelude::*;

use super::{backend_err, FONT};
use crate::error::RenderError;

/// Albers equal-area conic with the USGS parameters for the conterminous US.
#[derive(Debug, Clone, Copy)]
pub struct Albers {
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
}

impl Albers {
    pub fn conus() -> Self {
        Self::new(29.5, 45.5, 23.0, -96.0)
    }

    pub fn new(parallel1: f64, parallel2: f64, lat0: f64, lon0: f64) -> Self {
        let (phi1, phi2, phi0) = (parallel1.to_radians(), parallel2.to_radians(), lat0.to_radians());
        let n = (phi1.sin() + phi2.sin()) / 2.0;
        let c = phi1.cos().powi(2) + 2.0 * n * phi1.sin();
        let rho0 = (c - 2.0 * n * phi0.sin()).sqrt() / n;
        Self {
            n,
            c,
            rho0,
            lon0: lon0.to_radians(),
        }
    }

    /// Longitude/latitude degrees to planar units (unit sphere). North is +y.
    pub fn project(&self, lonlat: Coord<f64>) -> Coord<f64> {
        let rho = (self.c - 2.0 * self.n * lonlat.y.to_radians().sin()).sqrt() / self.n;
        let theta = self.n * (lonlat.x.to_radians() - self.lon0);
        Coord {
            x: rho * theta.sin(),
            y: self.rho0 - rho * theta.cos(),
        }
    }
}

/// Maps projected coordinates into a pixel box, preserving aspect ratio.
#[derive(Debug, Clone, Copy)]
struct Frame {
    bounds: Rect<f64>,
    scale: f64,
    offset: (f64, f64),
}

impl Frame {
    fn fit(bounds: Rect<f64>, (width, height): (u32, u32), margin: u32) -> Self {
        let usable_w = width.saturating_sub(2 * margin).max(1) as f64;
        let usable_h = height.saturating_sub(2 * margin).max(1) as f64;
        let span_w = bounds.width().max(f64::EPSILON);
        let span_h = bounds.height().max(f64::EPSILON);
        let scale = (usable_w / span_w).min(usable_h / span_h);
        let offset = (
            margin as f64 + (usable_w - span_w * scale) / 2.0,
            margin as f64 + (usable_h - span_h * scale) / 2.0,
        );
        Self { bounds, scale, offset }
    }

    fn pixel(&self, c: Coord<f64>) -> (i32, i32) {
        let x = self.offset.0 + (c.x - self.bounds.min().x) * self.scale;
        let y = self.offset.1 + (self.bounds.max().y - c.y) * self.scale;
        (x.round() as i32, y.round() as i32)
    }
}

/// One county to draw
pub struct MapFeature<'a> {
    pub shape: &'a MultiPolygon<f64>,
    pub fill: RGBColor,
}

/// Legend row: swatch colour and label
pub type LegendEntry = (RGBColor, String);

/// Every polygon with its fill, largest outer ring first. A county sitting in
/// another county's hole is smaller than that county, so it is painted after
/// the hole has been cleared.
fn paint_order(projected: &[(MultiPolygon<f64>, RGBColor)]) -> Vec<(&Shape<f64>, RGBColor)> {
    let mut polygons: Vec<(f64, &Shape<f64>, RGBColor)> = projected
        .iter()
        .flat_map(|(shape, fill)| shape.0.iter().map(move |polygon| (polygon, *fill)))
        .map(|(polygon, fill)| {
            let outer = Shape::new(polygon.exterior().clone(), vec![]).unsigned_area();
            (outer, polygon, fill)
        })
        .collect();
    polygons.sort_by(|a, b| b.0.total_cmp(&a.0));
    polygons.into_iter().map(|(_, polygon, fill)| (polygon, fill)).collect()
}

fn pixel_ring(ring: &LineString<f64>, frame: &Frame) -> Option<Vec<(i32, i32)>> {
    let pixels: Vec<(i32, i32)> = ring.coords().map(|c| frame.pixel(*c)).collect();
    (pixels.len() >= 3).then_some(pixels)
}

pub fn draw_map<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    features: &[MapFeature<'_>],
    legend: &[LegendEntry],
    legend_title: &str,
) -> Result<(), RenderError> {
    let projection = Albers::conus();
    let projected: Vec<(MultiPolygon<f64>, RGBColor)> = features
        .iter()
        .map(|f| (f.shape.map_coords(|c| projection.project(c)), f.fill))
        .collect();

    let bounds = projected
        .iter()
        .filter_map(|(shape, _)| shape.bounding_rect())
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
        .ok_or_else(|| RenderError::NoData("geometry".to_string()))?;

    let frame = Frame::fit(bounds, area.dim_in_pixel(), 20);
    let outline = WHITE.stroke_width(1);

    for (polygon, fill) in paint_order(&projected) {
        let Some(exterior) = pixel_ring(polygon.exterior(), &frame) else {
            continue;
        };
        area.draw(&Polygon::new(exterior.clone(), fill.filled()))
            .map_err(backend_err)?;
        area.draw(&PathElement::new(exterior, outline)).map_err(backend_err)?;

        // Holes show the canvas
        for hole in polygon.interiors().iter().filter_map(|ring| pixel_ring(ring, &frame)) {
            area.draw(&Polygon::new(hole.clone(), WHITE.filled()))
                .map_err(backend_err)?;
            area.draw(&PathElement::new(hole, outline)).map_err(backend_err)?;
        }
    }

    draw_legend(area, legend, legend_title)
}

/// Swatch legend in the lower-right corner.
fn draw_legend<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    legend: &[LegendEntry],
    title: &str,
) -> Result<(), RenderError> {
    if legend.is_empty() {
        return Ok(());
    }

    const ROW: i32 = 22;
    const SWATCH: i32 = 16;
    const BOX_WIDTH: i32 = 230;

    let (width, height) = area.dim_in_pixel();
    let box_height = ROW * (legend.len() as i32 + 1) + 10;
    let left = width as i32 - BOX_WIDTH - 20;
    let top = height as i32 - box_height - 20;

    area.draw(&Rectangle::new(
        [(left, top), (left + BOX_WIDTH, top + box_height)],
        WHITE.mix(0.85).filled(),
    ))
    .map_err(backend_err)?;
    area.draw(&Rectangle::new(
        [(left, top), (left + BOX_WIDTH, top + box_height)],
        BLACK.stroke_width(1),
    ))
    .map_err(backend_err)?;
    area.draw(&Text::new(title.to_string(), (left + 8, top + 6), (FONT, 16)))
        .map_err(backend_err)?;

    for (i, (color, label)) in legend.iter().enumerate() {
        let y = top + ROW * (i as i32 + 1) + 6;
        area.draw(&Rectangle::new(
            [(left + 8, y), (left + 8 + SWATCH, y + SWATCH)],
            color.filled(),
        ))
        .map_err(backend_err)?;
        area.draw(&Text::new(label.clone(), (left + 16 + SWATCH, y + 1), (FONT, 14)))
            .map_err(backend_err)?;
    }
    Ok(())
}
