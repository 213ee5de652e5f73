//! How far cleaning moved each geometry away from its input.

use crate::kernel::Geom;
use crate::snap::distortion_score;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PreservationReport {
    pub total_geometries: usize,
    pub significant_changes: usize,
    /// Sum of distortions over `total_geometries`, lost ones counting as 0.
    pub average_distortion: f64,
    pub max_distortion: f64,
    /// Had a geometry before cleaning and none after.
    pub geometries_lost: usize,
}

/// Compare index-aligned before/after geometries.
///
/// Lengths must match; on a mismatch an empty report for `original` is
/// returned.
pub fn audit_preservation(
    original: &[Option<&Geom>],
    cleaned: &[Option<&Geom>],
    significant_threshold: f64,
) -> PreservationReport {
    let mut report = PreservationReport {
        total_geometries: original.len(),
        ..PreservationReport::default()
    };
    if original.len() != cleaned.len() {
        warn!(
            "preservation: {} originals vs {} cleaned geometries, skipping audit",
            original.len(),
            cleaned.len()
        );
        return report;
    }

    let mut total = 0.0;
    for (i, pair) in original.iter().zip(cleaned).enumerate() {
        let (before, after) = match pair {
            (Some(before), Some(after)) => (before, after),
            (Some(_), None) => {
                report.geometries_lost += 1;
                continue;
            }
            _ => continue,
        };

        let distortion = distortion_score(before, after);
        total += distortion;
        report.max_distortion = report.max_distortion.max(distortion);
        if distortion > significant_threshold {
            report.significant_changes += 1;
            debug!("record {i}: significant boundary change, distortion {distortion:e}");
        }
    }

    if !original.is_empty() {
        report.average_distortion = total / original.len() as f64;
    }

    info!(
        "preservation: {} of {} significantly changed, average {:e}, max {:e}, {} lost",
        report.significant_changes,
        report.total_geometries,
        report.average_distortion,
        report.max_distortion,
        report.geometries_lost
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::testutil::rect;

    #[test]
    fn unchanged_geometries_score_zero() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(2.0, 0.0, 3.0, 1.0);
        let report = audit_preservation(&[Some(&a), Some(&b)], &[Some(&a), Some(&b)], 0.005);
        assert_eq!(report.total_geometries, 2);
        assert_eq!(report.significant_changes, 0);
        assert_eq!(report.max_distortion, 0.0);
        assert_eq!(report.average_distortion, 0.0);
    }

    #[test]
    fn moved_and_lost_geometries_are_counted() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let a_moved = rect(0.0, 0.0, 1.1, 1.0);
        let b = rect(2.0, 0.0, 3.0, 1.0);

        let report = audit_preservation(&[Some(&a), Some(&b)], &[Some(&a_moved), None], 0.005);
        assert_eq!(report.significant_changes, 1);
        assert_eq!(report.geometries_lost, 1);
        assert!((report.max_distortion - 0.2).abs() < 1e-9);
        assert!((report.average_distortion - 0.1).abs() < 1e-9);
    }

    #[test]
    fn length_mismatch_yields_empty_report() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let report = audit_preservation(&[Some(&a)], &[], 0.005);
        assert_eq!(report.total_geometries, 1);
        assert_eq!(report.significant_changes, 0);
    }
}
