//! Pairwise coverage audit: overlaps and near-miss gaps between records.
//!
//! Purely diagnostic. The audit reads the cleaned geometries and never
//! changes them.

use crate::config::{CleanConfig, PairStrategy};
use crate::executor::BatchExecutor;
use crate::grid::SpatialGrid;
use crate::kernel::{self, Geom};
use geo::Area;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Segments per quarter circle of the gap buffers.
const GAP_BUFFER_QUADRANT_SEGMENTS: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub overlap_count: usize,
    pub overlap_area: f64,
    pub gap_count: usize,
    /// Never measured; kept so reports keep the same shape.
    pub gap_area: f64,
    /// Sum of the gap distances of all gapped pairs.
    pub total_gap_length: f64,
    pub max_gap_width: f64,
    pub boundary_gaps: usize,
}

impl CoverageReport {
    pub fn is_clean(&self) -> bool {
        self.overlap_count == 0 && self.gap_count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapFinding {
    pub distance: f64,
    pub width: f64,
    pub segments: usize,
}

/// What one pair contributes to the report.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairFinding {
    pub overlap_area: Option<f64>,
    pub gap: Option<GapFinding>,
}

/// Overlap and gap analysis of a single pair.
pub fn analyze_pair(a: &Geom, b: &Geom, config: &CleanConfig) -> PairFinding {
    let (Some(bounds_a), Some(bounds_b)) = (a.bounds(), b.bounds()) else {
        return PairFinding::default();
    };
    // Boxes farther apart than the gap window can neither overlap nor gap.
    if bounds_a.distance(&bounds_b) > config.gap_search_distance() {
        return PairFinding::default();
    }

    let shared = kernel::overlap_area(a, b);
    let overlap_area = (shared > config.area_threshold()).then_some(shared);
    let gap = analyze_boundary_gap(a, b, config);

    PairFinding { overlap_area, gap }
}

/// Near-parallel boundaries a little apart: both boundaries are buffered and
/// a gap is reported when the buffers share enough area.
pub fn analyze_boundary_gap(a: &Geom, b: &Geom, config: &CleanConfig) -> Option<GapFinding> {
    let tol = config.tol();
    let distance = kernel::boundary_distance(a, b);
    if !(distance >= tol && distance <= config.gap_search_distance()) {
        return None;
    }

    let (bounds_a, bounds_b) = (a.bounds()?, b.bounds()?);
    let radius = config.gap_buffer_distance();
    // Only segments within two radii of the other boundary can contribute.
    let buffer_a = kernel::buffer_boundary_near(
        a,
        radius,
        GAP_BUFFER_QUADRANT_SEGMENTS,
        &bounds_b.expand(2.0 * radius),
    );
    let buffer_b = kernel::buffer_boundary_near(
        b,
        radius,
        GAP_BUFFER_QUADRANT_SEGMENTS,
        &bounds_a.expand(2.0 * radius),
    );

    let shared = geo::BooleanOps::intersection(&buffer_a, &buffer_b);
    if shared.unsigned_area() <= config.area_threshold() {
        return None;
    }

    let perimeter = kernel::perimeter(&shared);
    let segments = if perimeter > tol * 10.0 {
        ((perimeter / config.gap_segment_length()).floor() as usize).max(1)
    } else {
        1
    };

    Some(GapFinding {
        distance,
        width: distance,
        segments,
    })
}

/// Audit `geometries`, addressed by record index; `None` entries are skipped.
pub fn validate_coverage(
    geometries: &[Option<&Geom>],
    config: &CleanConfig,
    executor: &BatchExecutor,
) -> CoverageReport {
    let present = geometries.iter().filter(|g| g.is_some()).count();
    if present < 2 {
        info!("coverage: fewer than two geometries, nothing to compare");
        return CoverageReport::default();
    }

    let pairs = candidate_pairs(geometries, config);
    info!(
        "coverage: {} pairs over {} geometries ({:?})",
        pairs.len(),
        present,
        config.pair_strategy
    );

    let findings = executor.process("coverage", pairs, |(i, j)| {
        let finding = match (geometries[i], geometries[j]) {
            (Some(a), Some(b)) => analyze_pair(a, b, config),
            _ => PairFinding::default(),
        };
        (i, j, finding)
    });

    let mut report = CoverageReport::default();
    for (i, j, finding) in findings {
        if let Some(area) = finding.overlap_area {
            debug!("overlap between {i} and {j}: area {area:e}");
            report.overlap_count += 1;
            report.overlap_area += area;
        }
        if let Some(gap) = finding.gap {
            debug!(
                "gap between {i} and {j}: distance {:e}, {} segments",
                gap.distance, gap.segments
            );
            report.gap_count += 1;
            report.boundary_gaps += gap.segments;
            report.total_gap_length += gap.distance;
            report.max_gap_width = report.max_gap_width.max(gap.width);
        }
    }

    info!(
        "coverage: {} gaps ({} boundary segments, max width {:e}, total length {:e}), {} overlaps (area {:e})",
        report.gap_count,
        report.boundary_gaps,
        report.max_gap_width,
        report.total_gap_length,
        report.overlap_count,
        report.overlap_area
    );
    report
}

fn candidate_pairs(geometries: &[Option<&Geom>], config: &CleanConfig) -> Vec<(usize, usize)> {
    match config.pair_strategy {
        PairStrategy::AllPairs => {
            let present: Vec<usize> = geometries
                .iter()
                .enumerate()
                .filter_map(|(i, g)| g.map(|_| i))
                .collect();
            present
                .iter()
                .enumerate()
                .flat_map(|(k, &i)| present[k + 1..].iter().map(move |&j| (i, j)))
                .collect()
        }
        PairStrategy::GridNeighbors => {
            let mut grid = SpatialGrid::new(config.cell_size());
            for (i, g) in geometries.iter().enumerate() {
                if let Some(g) = g {
                    grid.insert(g, i, None);
                }
            }
            let search = config.gap_search_distance();
            geometries
                .iter()
                .enumerate()
                .filter_map(|(i, g)| g.map(|g| (i, g)))
                .flat_map(|(i, g)| {
                    grid.find_neighbors(g, search, Some(i))
                        .into_iter()
                        .filter(move |e| e.index > i)
                        .map(move |e| (i, e.index))
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tolerance;
    use crate::kernel::testutil::{rect, ring};
    use geo::Polygon;

    fn regular_polygon(cx: f64, cy: f64, r: f64, sides: usize) -> Geom {
        let mut coords: Vec<(f64, f64)> = (0..sides)
            .map(|k| {
                let t = std::f64::consts::TAU * k as f64 / sides as f64;
                (cx + r * t.cos(), cy + r * t.sin())
            })
            .collect();
        coords.push(coords[0]);
        Geom::polygon(Polygon::new(ring(&coords), vec![]))
    }

    fn config() -> CleanConfig {
        CleanConfig::default().with_tolerance(Tolerance::from_degrees(0.01))
    }

    fn executor() -> BatchExecutor {
        BatchExecutor::new(Some(2)).unwrap()
    }

    #[test]
    fn overlap_is_counted_with_its_area() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(0.5, 0.0, 1.5, 1.0);
        let report = validate_coverage(&[Some(&a), Some(&b)], &config(), &executor());
        assert_eq!(report.overlap_count, 1);
        assert!((report.overlap_area - 0.5).abs() < 1e-9);
    }

    #[test]
    fn narrow_gap_is_reported() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.02, 0.0, 2.0, 1.0);
        let report = validate_coverage(&[Some(&a), Some(&b)], &config(), &executor());
        assert_eq!(report.overlap_count, 0);
        assert_eq!(report.gap_count, 1);
        assert!((report.max_gap_width - 0.02).abs() < 1e-9);
        assert!((report.total_gap_length - 0.02).abs() < 1e-9);
        assert!(report.boundary_gaps > 1);
        assert_eq!(report.gap_area, 0.0);
    }

    #[test]
    fn shared_edge_and_far_pairs_are_clean() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let touching = rect(1.0, 0.0, 2.0, 1.0);
        let far = rect(5.0, 0.0, 6.0, 1.0);
        let report = validate_coverage(
            &[Some(&a), Some(&touching), Some(&far)],
            &config(),
            &executor(),
        );
        assert!(report.is_clean(), "{report:?}");
    }

    #[test]
    fn pair_analysis_is_symmetric() {
        let cfg = config();
        let cases = [
            (rect(0.0, 0.0, 1.0, 1.0), rect(0.5, 0.5, 1.5, 1.5)),
            (rect(0.0, 0.0, 1.0, 1.0), rect(1.03, 0.2, 2.0, 0.8)),
            (rect(0.0, 0.0, 1.0, 1.0), rect(3.0, 0.0, 4.0, 1.0)),
        ];
        for (a, b) in &cases {
            let ab = analyze_pair(a, b, &cfg);
            let ba = analyze_pair(b, a, &cfg);
            assert_eq!(ab.overlap_area.is_some(), ba.overlap_area.is_some());
            if let (Some(x), Some(y)) = (ab.overlap_area, ba.overlap_area) {
                assert!((x - y).abs() < 1e-12);
            }
            assert_eq!(ab.gap.is_some(), ba.gap.is_some());
            if let (Some(x), Some(y)) = (ab.gap, ba.gap) {
                assert!((x.distance - y.distance).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn missing_geometries_are_skipped() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let report = validate_coverage(&[Some(&a), None], &config(), &executor());
        assert_eq!(report, CoverageReport::default());
    }

    #[test]
    fn grid_strategy_matches_all_pairs() {
        let geoms: Vec<Geom> = vec![
            rect(0.0, 0.0, 1.0, 1.0),
            rect(0.5, 0.0, 1.5, 1.0),
            rect(1.52, 0.0, 2.5, 1.0),
            rect(9.0, 9.0, 10.0, 10.0),
        ];
        let refs: Vec<Option<&Geom>> = geoms.iter().map(Some).collect();

        let all = validate_coverage(&refs, &config(), &executor());
        let mut grid_config = config();
        grid_config.pair_strategy = PairStrategy::GridNeighbors;
        let grid = validate_coverage(&refs, &grid_config, &executor());

        assert_eq!(all.overlap_count, grid.overlap_count);
        assert_eq!(all.gap_count, grid.gap_count);
        assert_eq!(all.boundary_gaps, grid.boundary_gaps);
        assert!((all.overlap_area - grid.overlap_area).abs() < 1e-12);
    }

    #[test]
    fn distant_detailed_shapes_are_skipped_by_their_boxes() {
        let cfg = config();
        let a = regular_polygon(0.0, 0.0, 0.4, 64);
        let b = regular_polygon(2.0, 0.0, 0.4, 64);
        assert_eq!(analyze_pair(&a, &b, &cfg), PairFinding::default());

        let field: Vec<Geom> = (0..36)
            .map(|k| regular_polygon((k % 6) as f64 * 2.0, (k / 6) as f64 * 2.0, 0.4, 64))
            .collect();
        let refs: Vec<Option<&Geom>> = field.iter().map(Some).collect();
        let report = validate_coverage(&refs, &cfg, &executor());
        assert!(report.is_clean(), "{report:?}");
    }
}
