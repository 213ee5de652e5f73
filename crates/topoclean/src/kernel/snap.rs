//! Vertex and segment snapping of one geometry onto another.
//!
//! Two passes per ring, the way classic geometry snappers work:
//! 1. every source vertex within `tolerance` of a target vertex moves onto
//!    the nearest one; otherwise, if it lies within `tolerance` of a target
//!    segment, it moves onto the closest point of that segment;
//! 2. every target vertex within `tolerance` of a source segment (and not
//!    already a source vertex) is inserted into that segment.
//!
//! The output may be invalid; callers validate afterwards.

use super::{rings, Bounds, Geom, GeomKind};
use geo::{
    Closest, ClosestPoint, Coord, Distance, Euclidean, Line, LineLocatePoint, LineString,
    MultiPolygon, Point, Polygon,
};

/// Snap `g` onto `target`. `None` when the shell of any part collapses.
pub fn snap(g: &Geom, target: &Geom, tolerance: f64) -> Option<Geom> {
    if !(tolerance > 0.0) {
        return None;
    }
    let window = g.bounds()?.expand(tolerance);

    let mut target_vertices: Vec<Coord<f64>> = Vec::new();
    let mut target_segments: Vec<Line<f64>> = Vec::new();
    for ring in rings(target.shape()) {
        let coords = &ring.0;
        // Closing coordinate duplicates the first one.
        let open = &coords[..coords.len().saturating_sub(1)];
        target_vertices.extend(open.iter().copied().filter(|c| within(&window, *c)));
        target_segments.extend(
            coords
                .windows(2)
                .filter(|w| w[0] != w[1])
                .map(|w| Line::new(w[0], w[1]))
                .filter(|line| segment_near(&window, line)),
        );
    }

    if target_vertices.is_empty() && target_segments.is_empty() {
        return Some(g.clone());
    }

    let mut parts = Vec::with_capacity(g.num_parts());
    for polygon in g.polygons() {
        let shell = snap_ring(polygon.exterior(), &target_vertices, &target_segments, tolerance)?;
        let holes = polygon
            .interiors()
            .iter()
            .filter_map(|hole| snap_ring(hole, &target_vertices, &target_segments, tolerance))
            .collect();
        parts.push(Polygon::new(shell, holes));
    }

    Some(match g.kind() {
        GeomKind::Polygon if parts.len() == 1 => Geom::polygon(parts.remove(0)),
        _ => Geom::multi_polygon(MultiPolygon::new(parts)),
    })
}

fn snap_ring(
    ring: &LineString<f64>,
    target_vertices: &[Coord<f64>],
    target_segments: &[Line<f64>],
    tolerance: f64,
) -> Option<LineString<f64>> {
    let coords = &ring.0;
    if coords.len() < 4 {
        return None;
    }
    let open = &coords[..coords.len() - 1];

    // Pass 1: move vertices.
    let moved: Vec<Coord<f64>> = open
        .iter()
        .map(|&c| snap_vertex(c, target_vertices, target_segments, tolerance))
        .collect();

    // Pass 2: insert target vertices into nearby source segments.
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(moved.len() * 2);
    for i in 0..moved.len() {
        let a = moved[i];
        let b = moved[(i + 1) % moved.len()];
        out.push(a);
        if a == b {
            continue;
        }

        let segment = Line::new(a, b);
        let mut inserts: Vec<(f64, Coord<f64>)> = target_vertices
            .iter()
            .filter(|v| **v != a && **v != b && !moved.contains(v))
            .filter_map(|&v| {
                let t = segment.line_locate_point(&Point::from(v))?;
                let near = Euclidean::distance(v, closest_on(&segment, v)) <= tolerance;
                (t > 0.0 && t < 1.0 && near).then_some((t, v))
            })
            .collect();
        inserts.sort_by(|x, y| x.0.total_cmp(&y.0));
        inserts.dedup_by(|x, y| x.1 == y.1);
        out.extend(inserts.into_iter().map(|(_, v)| v));
    }

    out.dedup();
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    if out.len() < 3 {
        return None;
    }
    if let Some(first) = out.first().copied() {
        out.push(first);
    }
    Some(LineString::new(out))
}

fn snap_vertex(
    c: Coord<f64>,
    target_vertices: &[Coord<f64>],
    target_segments: &[Line<f64>],
    tolerance: f64,
) -> Coord<f64> {
    let nearest_vertex = target_vertices
        .iter()
        .map(|v| (v, Euclidean::distance(*v, c)))
        .filter(|(_, d)| *d <= tolerance)
        .min_by(|x, y| x.1.total_cmp(&y.1));
    if let Some((v, _)) = nearest_vertex {
        return *v;
    }

    target_segments
        .iter()
        .map(|segment| closest_on(segment, c))
        .map(|q| (q, Euclidean::distance(q, c)))
        .filter(|(_, d)| *d <= tolerance)
        .min_by(|x, y| x.1.total_cmp(&y.1))
        .map_or(c, |(q, _)| q)
}

fn closest_on(segment: &Line<f64>, c: Coord<f64>) -> Coord<f64> {
    match segment.closest_point(&Point::from(c)) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => p.0,
        Closest::Indeterminate => segment.start,
    }
}

fn within(window: &Bounds, c: Coord<f64>) -> bool {
    c.x >= window.min_x && c.x <= window.max_x && c.y >= window.min_y && c.y <= window.max_y
}

fn segment_near(window: &Bounds, segment: &Line<f64>) -> bool {
    let (a, b) = (segment.start, segment.end);
    a.x.max(b.x) >= window.min_x
        && a.x.min(b.x) <= window.max_x
        && a.y.max(b.y) >= window.min_y
        && a.y.min(b.y) <= window.max_y
}

#[cfg(test)]
mod tests {
    use super::super::testutil::rect;
    use super::super::distance;
    use super::*;

    #[test]
    fn near_vertices_move_onto_target() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.05, 0.0, 2.0, 1.0);

        let snapped = snap(&b, &a, 0.1).unwrap();
        assert_eq!(snapped.kind(), GeomKind::Polygon);
        assert_eq!(distance(&snapped, &a), 0.0);
        assert!((snapped.area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn far_geometry_is_unchanged() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(5.0, 0.0, 6.0, 1.0);
        assert_eq!(snap(&b, &a, 0.1).unwrap(), b);
    }

    #[test]
    fn target_vertex_is_inserted_into_segment() {
        // The long edge of `b` runs past a corner of `a` at distance 0.02.
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.02, -1.0, 2.0, 3.0);

        let snapped = snap(&b, &a, 0.05).unwrap();
        let shell = &snapped.polygons()[0].exterior().0;
        assert!(shell.contains(&Coord { x: 1.0, y: 1.0 }));
        assert!(shell.contains(&Coord { x: 1.0, y: 0.0 }));
    }

    #[test]
    fn non_positive_tolerance_yields_nothing() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        assert!(snap(&a, &a, 0.0).is_none());
    }
}
