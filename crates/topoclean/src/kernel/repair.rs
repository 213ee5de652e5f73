//! Make-valid with collapsed fragments discarded.
//!
//! Rings are first scrubbed (non-finite and repeated coordinates removed,
//! rings closed); rings left with fewer than four coordinates or no area are
//! collapsed and dropped. Each surviving part is then re-noded by a boolean
//! union with nothing, which splits self-intersecting rings into simple
//! faces, and the parts are merged with a cascaded union.

use super::{Geom, GeomKind};
use geo::kernels::{Kernel, Orientation, RobustKernel};
use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};

/// Repair `g`. Returns `None` when nothing with area survives.
pub fn make_valid(g: &Geom) -> Option<Geom> {
    let parts: Vec<MultiPolygon<f64>> = g
        .polygons()
        .iter()
        .filter_map(scrub_polygon)
        .map(|p| renode(&p))
        .filter(|mp| !mp.0.is_empty())
        .collect();

    let merged = cascaded_union(parts)?;
    let mut polygons: Vec<Polygon<f64>> = merged
        .0
        .into_iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .collect();

    match (g.kind(), polygons.len()) {
        (_, 0) => None,
        (GeomKind::Polygon, 1) => polygons.pop().map(Geom::polygon),
        _ => Some(Geom::multi_polygon(MultiPolygon::new(polygons))),
    }
}

/// Divide-and-conquer union; `None` for an empty input.
pub(crate) fn cascaded_union(mut shapes: Vec<MultiPolygon<f64>>) -> Option<MultiPolygon<f64>> {
    match shapes.len() {
        0 => None,
        1 => shapes.pop(),
        n => {
            let right = shapes.split_off(n / 2);
            let (left, right) = rayon::join(|| cascaded_union(shapes), || cascaded_union(right));
            match (left, right) {
                (Some(l), Some(r)) => Some(l.union(&r)),
                (l, r) => l.or(r),
            }
        }
    }
}

fn scrub_polygon(polygon: &Polygon<f64>) -> Option<Polygon<f64>> {
    let shell = scrub_ring(polygon.exterior())?;
    let holes = polygon.interiors().iter().filter_map(scrub_ring).collect();
    Some(Polygon::new(shell, holes))
}

fn scrub_ring(ring: &LineString<f64>) -> Option<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len() + 1);
    for c in ring.0.iter().filter(|c| c.x.is_finite() && c.y.is_finite()) {
        if coords.last() != Some(c) {
            coords.push(*c);
        }
    }
    if let (Some(first), Some(last)) = (coords.first().copied(), coords.last().copied()) {
        if first != last {
            coords.push(first);
        }
    }

    let ring = LineString::new(coords);
    if ring.0.len() < 4 || is_collinear(&ring) {
        return None;
    }
    Some(ring)
}

/// Every coordinate on one line: nothing for re-noding to recover. A
/// figure-eight ring has zero signed area too but is kept.
fn is_collinear(ring: &LineString<f64>) -> bool {
    let a = ring.0[0];
    let Some(b) = ring.0.iter().copied().find(|c| *c != a) else {
        return true;
    };
    ring.0
        .iter()
        .all(|&c| RobustKernel::orient2d(a, b, c) == Orientation::Collinear)
}

fn renode(polygon: &Polygon<f64>) -> MultiPolygon<f64> {
    let oriented = polygon.orient(Direction::Default);
    MultiPolygon::new(vec![oriented]).union(&MultiPolygon::<f64>::new(Vec::new()))
}
