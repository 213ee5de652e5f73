//! Validity testing with a human readable reason.
//!
//! Rules checked, per part: finite coordinates, closed rings of at least four
//! coordinates, non-zero shell area, no crossing or collinear-overlapping
//! edges within or between rings, holes inside their shell. Across parts:
//! boundaries meet at points only and no two parts share area. Rings touching
//! themselves at a single vertex are accepted.

use super::Geom;
use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Area, BooleanOps, BoundingRect, Coord, Intersects, Line, LineString, Polygon, Winding};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum InvalidReason {
    Empty,
    NonFiniteCoordinate,
    TooFewPoints { at: Coord<f64> },
    RingNotClosed { at: Coord<f64> },
    ZeroAreaShell { at: Coord<f64> },
    SelfIntersection { at: Coord<f64> },
    HoleOutsideShell { at: Coord<f64> },
    OverlappingParts { at: Coord<f64> },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::Empty => f.write_str("Empty geometry"),
            InvalidReason::NonFiniteCoordinate => f.write_str("Invalid Coordinate"),
            InvalidReason::TooFewPoints { at } => {
                write!(f, "Too few points in geometry component[{} {}]", at.x, at.y)
            }
            InvalidReason::RingNotClosed { at } => write!(f, "Ring not closed[{} {}]", at.x, at.y),
            InvalidReason::ZeroAreaShell { at } => write!(f, "Zero-area shell[{} {}]", at.x, at.y),
            InvalidReason::SelfIntersection { at } => {
                write!(f, "Self-intersection[{} {}]", at.x, at.y)
            }
            InvalidReason::HoleOutsideShell { at } => {
                write!(f, "Hole lies outside shell[{} {}]", at.x, at.y)
            }
            InvalidReason::OverlappingParts { at } => {
                write!(f, "Nested or overlapping shells[{} {}]", at.x, at.y)
            }
        }
    }
}

pub fn is_valid(g: &Geom) -> bool {
    validity_reason(g).is_none()
}

/// `None` when the geometry is valid, otherwise the first problem found.
pub fn validity_reason(g: &Geom) -> Option<InvalidReason> {
    if g.is_empty() {
        return Some(InvalidReason::Empty);
    }

    for polygon in g.polygons() {
        if let Some(reason) = polygon_reason(polygon) {
            return Some(reason);
        }
    }

    parts_conflict(g.polygons())
}

pub(crate) fn polygon_reason(polygon: &Polygon<f64>) -> Option<InvalidReason> {
    let rings: Vec<&LineString<f64>> = polygon_rings(polygon).collect();

    for ring in &rings {
        if let Some(reason) = ring_shape_reason(ring) {
            return Some(reason);
        }
    }

    for ring in &rings {
        if let Some(at) = ring_self_intersection(ring) {
            return Some(InvalidReason::SelfIntersection { at });
        }
    }

    // Closed and at least four coordinates by now; no orientation means flat.
    let shell = polygon.exterior();
    if shell.winding_order().is_none() {
        return Some(InvalidReason::ZeroAreaShell { at: shell.0[0] });
    }

    for (i, a) in rings.iter().enumerate() {
        for b in rings.iter().skip(i + 1) {
            if let Some(at) = rings_cross(a, b) {
                return Some(InvalidReason::SelfIntersection { at });
            }
        }
    }

    if !polygon.interiors().is_empty() {
        let bare_shell = Polygon::new(shell.clone(), vec![]);
        for hole in polygon.interiors() {
            if let Some(outside) = hole.0.iter().find(|c| !bare_shell.intersects(*c)) {
                return Some(InvalidReason::HoleOutsideShell { at: *outside });
            }
        }
    }

    None
}

fn ring_shape_reason(ring: &LineString<f64>) -> Option<InvalidReason> {
    let coords = &ring.0;
    if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Some(InvalidReason::NonFiniteCoordinate);
    }
    let Some(first) = coords.first().copied() else {
        return Some(InvalidReason::Empty);
    };
    if coords.len() < 4 {
        return Some(InvalidReason::TooFewPoints { at: first });
    }
    if coords.last() != Some(&first) {
        return Some(InvalidReason::RingNotClosed { at: first });
    }
    None
}

/// Non-zero-length edges of a closed ring.
fn edges(ring: &LineString<f64>) -> Vec<Line<f64>> {
    ring.0
        .windows(2)
        .filter(|w| w[0] != w[1])
        .map(|w| Line::new(w[0], w[1]))
        .collect()
}

fn ring_self_intersection(ring: &LineString<f64>) -> Option<Coord<f64>> {
    let edges = edges(ring);
    let n = edges.len();

    for (a, &ea) in edges.iter().enumerate() {
        for (b, &eb) in edges.iter().enumerate().skip(a + 1) {
            let adjacent = b == a + 1 || (a == 0 && b == n - 1);
            match line_intersection(ea, eb) {
                Some(LineIntersection::SinglePoint { intersection, is_proper }) => {
                    if is_proper && !adjacent {
                        return Some(intersection);
                    }
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    // Adjacent edges folding back on each other form a spike.
                    if intersection.start != intersection.end {
                        return Some(intersection.start);
                    }
                }
                None => {}
            }
        }
    }
    None
}

fn rings_cross(a: &LineString<f64>, b: &LineString<f64>) -> Option<Coord<f64>> {
    let (Some(ra), Some(rb)) = (a.bounding_rect(), b.bounding_rect()) else {
        return None;
    };
    if !ra.intersects(&rb) {
        return None;
    }

    let eb = edges(b);
    for la in edges(a) {
        for &lb in &eb {
            match line_intersection(la, lb) {
                Some(LineIntersection::SinglePoint { intersection, is_proper: true }) => {
                    return Some(intersection)
                }
                Some(LineIntersection::Collinear { intersection })
                    if intersection.start != intersection.end =>
                {
                    return Some(intersection.start)
                }
                _ => {}
            }
        }
    }
    None
}

fn polygon_rings(polygon: &Polygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors())
}

/// Parts may only touch at points: shared area is an overlap, a crossing or
/// a shared stretch of boundary a self-intersection.
fn parts_conflict(parts: &[Polygon<f64>]) -> Option<InvalidReason> {
    for (i, a) in parts.iter().enumerate() {
        for b in parts.iter().skip(i + 1) {
            let (Some(ra), Some(rb)) = (a.bounding_rect(), b.bounding_rect()) else {
                continue;
            };
            if !ra.intersects(&rb) {
                continue;
            }

            let shared = a.intersection(b).unsigned_area();
            let scale = a.unsigned_area().min(b.unsigned_area());
            if shared > scale * 1e-9 {
                return Some(InvalidReason::OverlappingParts { at: b.exterior().0[0] });
            }

            for ring_a in polygon_rings(a) {
                for ring_b in polygon_rings(b) {
                    if let Some(at) = rings_cross(ring_a, ring_b) {
                        return Some(InvalidReason::SelfIntersection { at });
                    }
                }
            }
        }
    }
    None
}
