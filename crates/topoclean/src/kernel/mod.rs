//! Geometry kernel adapter.
//!
//! Everything the cleaning pipeline asks of computational geometry goes
//! through this module. Clipping, areas, bounding boxes and Hausdorff
//! distances come straight from the `geo` crate; the operations `geo` does not
//! ship (vertex snapping, validity reasons, make-valid, boundary buffers) are
//! built here on top of its primitives.
//!
//! A [`Geom`] owns its coordinates. Operations never mutate their inputs; they
//! return a new value that the caller assigns over the old one, so a superseded
//! geometry is dropped exactly once.

mod buffer;
mod repair;
mod snap;
mod validity;

pub use buffer::{buffer_boundary, buffer_boundary_near};
pub use repair::make_valid;
pub use snap::snap;
pub use validity::{is_valid, validity_reason, InvalidReason};
pub(crate) use repair::cascaded_union;
pub(crate) use validity::polygon_reason;

use geo::{
    Area, BooleanOps, BoundingRect, Distance, Euclidean, HausdorffDistance, Intersects, Length,
    LineString, MultiPolygon, Polygon, Relate,
};

/// Declared GeoJSON type of a [`Geom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeomKind {
    Polygon,
    MultiPolygon,
}

impl GeomKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GeomKind::Polygon => "Polygon",
            GeomKind::MultiPolygon => "MultiPolygon",
        }
    }
}

impl std::fmt::Display for GeomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An owned polygonal geometry.
///
/// Internally always a `MultiPolygon`; `kind` remembers whether it should be
/// written back out as a single `Polygon`.
#[derive(Debug, Clone, PartialEq)]
pub struct Geom {
    kind: GeomKind,
    shape: MultiPolygon<f64>,
}

impl Geom {
    pub fn polygon(polygon: Polygon<f64>) -> Self {
        Self {
            kind: GeomKind::Polygon,
            shape: MultiPolygon::new(vec![polygon]),
        }
    }

    pub fn multi_polygon(shape: MultiPolygon<f64>) -> Self {
        Self {
            kind: GeomKind::MultiPolygon,
            shape,
        }
    }

    /// Recompose decomposed parts: one part is a Polygon, several a
    /// MultiPolygon, none is no geometry at all.
    pub fn from_parts(mut parts: Vec<Polygon<f64>>) -> Option<Self> {
        match parts.len() {
            0 => None,
            1 => parts.pop().map(Self::polygon),
            _ => Some(Self::multi_polygon(MultiPolygon::new(parts))),
        }
    }

    pub fn kind(&self) -> GeomKind {
        self.kind
    }

    pub fn shape(&self) -> &MultiPolygon<f64> {
        &self.shape
    }

    pub fn into_shape(self) -> MultiPolygon<f64> {
        self.shape
    }

    pub fn polygons(&self) -> &[Polygon<f64>] {
        &self.shape.0
    }

    pub fn num_parts(&self) -> usize {
        self.shape.0.len()
    }

    pub fn part(&self, i: usize) -> Option<&Polygon<f64>> {
        self.shape.0.get(i)
    }

    /// True when there is no part with a non-empty exterior ring.
    pub fn is_empty(&self) -> bool {
        self.shape.0.iter().all(|p| p.exterior().0.is_empty())
    }

    pub fn area(&self) -> f64 {
        self.shape.unsigned_area()
    }

    /// Total boundary length (exteriors and holes).
    pub fn length(&self) -> f64 {
        perimeter(&self.shape)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.shape.bounding_rect().map(|rect| Bounds {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        })
    }
}

/// Axis-aligned bounding box in the input's coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite() && self.min_y.is_finite() && self.max_x.is_finite() && self.max_y.is_finite()
    }

    /// Grow by `d` on every side. This is exactly the bounding box of a round
    /// buffer of distance `d` around whatever these bounds enclose.
    pub fn expand(&self, d: f64) -> Bounds {
        Bounds {
            min_x: self.min_x - d,
            min_y: self.min_y - d,
            max_x: self.max_x + d,
            max_y: self.max_y + d,
        }
    }

    /// Gap between two boxes; 0 when they touch or overlap.
    pub fn distance(&self, other: &Bounds) -> f64 {
        let dx = (other.min_x - self.max_x).max(self.min_x - other.max_x).max(0.0);
        let dy = (other.min_y - self.max_y).max(self.min_y - other.max_y).max(0.0);
        dx.hypot(dy)
    }
}

pub fn area(g: &Geom) -> f64 {
    g.area()
}

/// Perimeter, holes included.
pub fn length(g: &Geom) -> f64 {
    g.length()
}

pub fn intersects(a: &Geom, b: &Geom) -> bool {
    a.shape.intersects(&b.shape)
}

pub fn intersection(a: &Geom, b: &Geom) -> MultiPolygon<f64> {
    a.shape.intersection(&b.shape)
}

pub fn union(a: &Geom, b: &Geom) -> Geom {
    Geom::multi_polygon(a.shape.union(&b.shape))
}

fn bounds_meet(a: &Geom, b: &Geom) -> bool {
    matches!((a.bounds(), b.bounds()), (Some(ba), Some(bb)) if ba.distance(&bb) == 0.0)
}

/// Areal overlap (DE-9IM `overlaps`): the interiors share area and neither
/// geometry covers the other. Symmetric in its arguments.
pub fn overlaps(a: &Geom, b: &Geom) -> bool {
    bounds_meet(a, b) && a.shape.relate(&b.shape).is_overlaps()
}

/// Shared area when `a` and `b` overlap, 0 otherwise.
pub fn overlap_area(a: &Geom, b: &Geom) -> f64 {
    if !overlaps(a, b) {
        return 0.0;
    }
    intersection(a, b).unsigned_area()
}

/// Minimum Euclidean distance between two geometries; 0 when they intersect.
pub fn distance(a: &Geom, b: &Geom) -> f64 {
    Euclidean::distance(&a.shape, &b.shape)
}

/// Minimum distance between the rings of `a` and the rings of `b`. Unlike
/// [`distance`] this is positive for a geometry nested inside another.
pub fn boundary_distance(a: &Geom, b: &Geom) -> f64 {
    rings(&a.shape)
        .flat_map(|ring_a| rings(&b.shape).map(move |ring_b| (ring_a, ring_b)))
        .map(|(ring_a, ring_b)| Euclidean::distance(ring_a, ring_b))
        .fold(f64::INFINITY, f64::min)
}

/// Discrete Hausdorff distance over the vertices of both geometries.
pub fn hausdorff_distance(a: &Geom, b: &Geom) -> f64 {
    a.shape.hausdorff_distance(&b.shape)
}

/// Every ring of every part, exteriors first within each part.
pub(crate) fn rings(shape: &MultiPolygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    shape
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors().iter()))
}

/// Total ring length of a shape.
pub(crate) fn perimeter(shape: &MultiPolygon<f64>) -> f64 {
    rings(shape).map(|ring| ring.length::<Euclidean>()).sum()
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::Geom;
    use geo::{LineString, Polygon};

    pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Geom {
        Geom::polygon(rect_polygon(x0, y0, x1, y1))
    }

    pub fn rect_polygon(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]),
            vec![],
        )
    }

    pub fn ring(coords: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(coords.to_vec())
    }
}
