//! Coordinate truncation to a fixed number of decimals.

use crate::error::GeometryError;
use crate::kernel::{polygon_reason, Geom};
use geo::{Coord, LineString, Polygon};
use rayon::prelude::*;

/// Round half away from zero to `precision` decimals.
#[inline]
pub fn round_to(value: f64, precision: u32) -> f64 {
    let ratio = 10f64.powi(precision as i32);
    (value * ratio).round() / ratio
}

fn round_ring(ring: &LineString<f64>, precision: u32) -> LineString<f64> {
    ring.0
        .iter()
        .map(|c| Coord {
            x: round_to(c.x, precision),
            y: round_to(c.y, precision),
        })
        .collect()
}

/// Truncate one polygon. An exterior of three or fewer coordinates yields
/// nothing; a hole that is not a valid ring on its own after rounding is
/// dropped.
pub fn truncate_polygon(polygon: &Polygon<f64>, precision: u32) -> Option<Polygon<f64>> {
    if polygon.exterior().0.len() <= 3 {
        return None;
    }
    let shell = round_ring(polygon.exterior(), precision);

    let holes = polygon
        .interiors()
        .iter()
        .filter(|hole| hole.0.len() > 3)
        .map(|hole| round_ring(hole, precision))
        .filter(|hole| polygon_reason(&Polygon::new(hole.clone(), vec![])).is_none())
        .collect();

    Some(Polygon::new(shell, holes))
}

/// Truncate every valid part of `geometry`, in parallel, and recompose them
/// in their original order.
pub fn truncate_geometry(geometry: Option<&Geom>, precision: u32) -> Result<Geom, GeometryError> {
    let geometry = geometry.ok_or(GeometryError::NilGeometry)?;

    let parts: Vec<Polygon<f64>> = geometry
        .polygons()
        .par_iter()
        .filter(|p| polygon_reason(p).is_none())
        .filter_map(|p| truncate_polygon(p, precision))
        .collect();

    Geom::from_parts(parts).ok_or(GeometryError::NoValidGeometry)
}
