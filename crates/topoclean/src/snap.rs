//! Conservative snapping: a snap is only kept when it barely changes the
//! geometry.

use crate::kernel::{self, Geom};

/// Relative area change plus Hausdorff distance. Zero when the original has
/// no area.
pub fn distortion_score(original: &Geom, modified: &Geom) -> f64 {
    let original_area = original.area();
    if original_area == 0.0 {
        return 0.0;
    }
    let area_change = ((modified.area() - original_area) / original_area).abs();
    area_change + kernel::hausdorff_distance(original, modified)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    /// The kernel produced no geometry.
    NoResult,
    /// Snapping moved nothing.
    Unchanged,
    /// Distortion score above the budget.
    Distortion(f64),
}

#[derive(Debug)]
pub enum SnapOutcome {
    Accepted { geometry: Geom, distortion: f64 },
    /// The geometry handed to `try_snap`, untouched.
    Rejected { geometry: Geom, reason: RejectReason },
}

impl SnapOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SnapOutcome::Accepted { .. })
    }

    pub fn into_geometry(self) -> Geom {
        match self {
            SnapOutcome::Accepted { geometry, .. } | SnapOutcome::Rejected { geometry, .. } => {
                geometry
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapPolicy {
    pub tolerance: f64,
    pub max_distortion: f64,
}

impl SnapPolicy {
    pub fn new(tolerance: f64, max_distortion: f64) -> Self {
        Self {
            tolerance,
            max_distortion,
        }
    }

    /// Snap `geometry` onto `target` and keep the result only if its
    /// distortion stays within budget. On rejection the input comes back as
    /// it went in.
    pub fn try_snap(&self, geometry: Geom, target: &Geom) -> SnapOutcome {
        let Some(snapped) = kernel::snap(&geometry, target, self.tolerance) else {
            return SnapOutcome::Rejected {
                geometry,
                reason: RejectReason::NoResult,
            };
        };
        if snapped == geometry {
            return SnapOutcome::Rejected {
                geometry,
                reason: RejectReason::Unchanged,
            };
        }

        let distortion = distortion_score(&geometry, &snapped);
        if distortion > self.max_distortion {
            return SnapOutcome::Rejected {
                geometry,
                reason: RejectReason::Distortion(distortion),
            };
        }

        SnapOutcome::Accepted {
            geometry: snapped,
            distortion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::testutil::rect;

    #[test]
    fn score_of_identical_geometry_is_zero() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        assert_eq!(distortion_score(&a, &a), 0.0);
    }

    #[test]
    fn score_adds_area_ratio_and_hausdorff() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(0.0, 0.0, 1.1, 1.0);
        // 10% more area, farthest vertex moved by 0.1.
        assert!((distortion_score(&a, &b) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn accepted_snap_is_within_budget() {
        let anchor = rect(0.0, 0.0, 1.0, 1.0);
        let moved = rect(1.001, 0.0, 2.0, 1.0);
        let policy = SnapPolicy::new(0.01, 0.01);

        match policy.try_snap(moved, &anchor) {
            SnapOutcome::Accepted { geometry, distortion } => {
                assert!(distortion <= policy.max_distortion);
                assert_eq!(kernel::distance(&geometry, &anchor), 0.0);
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn rejection_returns_the_same_value() {
        let anchor = rect(0.0, 0.0, 1.0, 1.0);
        let moved = rect(1.001, 0.0, 2.0, 1.0);
        let before = moved.clone();
        let address = moved.polygons().as_ptr();

        // Budget too tight for any movement.
        let policy = SnapPolicy::new(0.01, 1e-9);
        match policy.try_snap(moved, &anchor) {
            SnapOutcome::Rejected { geometry, reason } => {
                assert!(matches!(reason, RejectReason::Distortion(_)));
                assert_eq!(geometry, before);
                // Same heap allocation: moved back out, not rebuilt.
                assert_eq!(geometry.polygons().as_ptr(), address);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn far_target_is_unchanged() {
        let anchor = rect(0.0, 0.0, 1.0, 1.0);
        let far = rect(5.0, 0.0, 6.0, 1.0);
        let outcome = SnapPolicy::new(0.01, 1.0).try_snap(far, &anchor);
        assert!(matches!(
            outcome,
            SnapOutcome::Rejected { reason: RejectReason::Unchanged, .. }
        ));
    }
}
