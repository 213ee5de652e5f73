//! Round buffer of a geometry's boundary.
//!
//! Each boundary segment is swept into a stadium (a rectangle capped by two
//! half discs); the union of all stadiums is the buffer. Only used on the
//! small candidate areas of the gap analysis, where segment counts are low.

use super::repair::cascaded_union;
use super::{rings, Bounds, Geom};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use std::f64::consts::PI;

/// Buffer every ring of `g` by `distance`, approximating quarter circles with
/// `quadrant_segments` segments. Empty for a non-positive distance.
pub fn buffer_boundary(g: &Geom, distance: f64, quadrant_segments: usize) -> MultiPolygon<f64> {
    sweep(g, distance, quadrant_segments, None)
}

/// Like [`buffer_boundary`], restricted to the segments whose bounding box
/// meets `window`. The result is exact inside `window`.
pub fn buffer_boundary_near(
    g: &Geom,
    distance: f64,
    quadrant_segments: usize,
    window: &Bounds,
) -> MultiPolygon<f64> {
    sweep(g, distance, quadrant_segments, Some(window))
}

fn sweep(
    g: &Geom,
    distance: f64,
    quadrant_segments: usize,
    window: Option<&Bounds>,
) -> MultiPolygon<f64> {
    if !(distance > 0.0) {
        return MultiPolygon::new(Vec::new());
    }
    let quadrant_segments = quadrant_segments.max(1);

    let stadiums: Vec<MultiPolygon<f64>> = rings(g.shape())
        .flat_map(|ring| ring.0.windows(2))
        .filter(|w| w[0] != w[1])
        .filter(|w| window.map_or(true, |b| segment_meets(b, w[0], w[1])))
        .map(|w| MultiPolygon::new(vec![stadium(w[0], w[1], distance, quadrant_segments)]))
        .collect();

    cascaded_union(stadiums).unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

fn segment_meets(window: &Bounds, a: Coord<f64>, b: Coord<f64>) -> bool {
    a.x.max(b.x) >= window.min_x
        && a.x.min(b.x) <= window.max_x
        && a.y.max(b.y) >= window.min_y
        && a.y.min(b.y) <= window.max_y
}

fn stadium(a: Coord<f64>, b: Coord<f64>, r: f64, quadrant_segments: usize) -> Polygon<f64> {
    let heading = (b.y - a.y).atan2(b.x - a.x);
    let steps = quadrant_segments * 2;

    let mut coords = Vec::with_capacity(2 * (steps + 1) + 1);
    // Cap around `b` sweeps from the right-hand side to the left-hand side,
    // then the cap around `a` closes the loop counter-clockwise.
    for (centre, start) in [(b, heading - PI / 2.0), (a, heading + PI / 2.0)] {
        for i in 0..=steps {
            let angle = start + PI * i as f64 / steps as f64;
            coords.push(Coord {
                x: centre.x + r * angle.cos(),
                y: centre.y + r * angle.sin(),
            });
        }
    }
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    Polygon::new(LineString::new(coords), vec![])
}

#[cfg(test)]
mod tests {
    use super::super::testutil::rect;
    use super::*;
    use geo::Area;

    #[test]
    fn buffer_area_matches_ring_sweep() {
        // Unit square ring swept by 0.1 on both sides: an annulus with
        // rounded outer corners.
        let square = rect(0.0, 0.0, 1.0, 1.0);
        let buffered = buffer_boundary(&square, 0.1, 8);

        let outer = 1.2 * 1.2 - (4.0 - PI) * 0.01;
        let inner = 0.8 * 0.8;
        assert!((buffered.unsigned_area() - (outer - inner)).abs() < 1e-3);
    }

    #[test]
    fn window_keeps_only_nearby_segments() {
        let square = rect(0.0, 0.0, 1.0, 1.0);
        // Only the right edge (x = 1) reaches into the window.
        let window = Bounds { min_x: 1.05, min_y: 0.4, max_x: 2.0, max_y: 0.6 };
        let near = buffer_boundary_near(&square, 0.1, 8, &window.expand(0.1));
        let full = buffer_boundary(&square, 0.1, 8);
        assert!(near.unsigned_area() < full.unsigned_area() / 2.0);
        assert!(near.unsigned_area() > 0.2);
    }

    #[test]
    fn zero_distance_is_empty() {
        let square = rect(0.0, 0.0, 1.0, 1.0);
        assert!(buffer_boundary(&square, 0.0, 8).0.is_empty());
    }

    #[test]
    fn stadium_is_counter_clockwise() {
        let s = stadium(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }, 0.5, 4);
        assert!(s.signed_area() > 0.0);
        assert!((s.unsigned_area() - (1.0 + PI * 0.25)).abs() < 0.05);
    }
}
