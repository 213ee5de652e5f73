//! Run configuration.
//!
//! Every threshold the pipeline uses is a multiple of one base tolerance.
//! The factors live here so a caller can tune them per run; `Default`
//! reproduces the production constants.

use serde::{Deserialize, Serialize};

/// Degrees per meter near the equator, used for the metric conversion.
pub const METERS_PER_DEGREE: f64 = 111_000.0;

pub const DEFAULT_TOLERANCE_M: f64 = 0.4;
pub const DEFAULT_PRECISION: u32 = 7;

/// Base distance threshold, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance(f64);

impl Tolerance {
    /// `10^-precision * 10`: one unit of the next-coarser decimal place.
    pub fn from_precision(precision: u32) -> Self {
        Self(10f64.powi(-(precision as i32)) * 10.0)
    }

    pub fn from_meters(meters: f64) -> Self {
        Self(meters / METERS_PER_DEGREE)
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self(degrees)
    }

    pub fn degrees(self) -> f64 {
        self.0
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::from_meters(DEFAULT_TOLERANCE_M)
    }
}

/// Which record pairs the coverage audit looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStrategy {
    /// Every unordered pair. Quadratic, exhaustive.
    #[default]
    AllPairs,
    /// Only pairs the spatial grid reports within the gap search distance.
    GridNeighbors,
}

/// Which neighbors a record is snapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapTargets {
    /// Every neighbor within the search distance, in ascending index order.
    #[default]
    AllNeighbors,
    /// Only neighbors with a lower record index, so a shared boundary moves
    /// on one side only.
    LowerIndexOnly,
}

impl SnapTargets {
    /// Whether record `index` may snap onto record `neighbor`.
    pub fn admits(self, index: usize, neighbor: usize) -> bool {
        match self {
            SnapTargets::AllNeighbors => true,
            SnapTargets::LowerIndexOnly => neighbor < index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanConfig {
    pub tolerance: Tolerance,
    /// Decimal places kept by the truncator.
    pub precision: u32,
    pub cell_size_factor: f64,
    pub neighbor_search_factor: f64,
    pub max_distortion_factor: f64,
    pub significant_change_factor: f64,
    pub gap_search_factor: f64,
    pub gap_buffer_factor: f64,
    pub gap_segment_factor: f64,
    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<usize>,
    pub pair_strategy: PairStrategy,
    pub snap_targets: SnapTargets,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::default(),
            precision: DEFAULT_PRECISION,
            cell_size_factor: 100.0,
            neighbor_search_factor: 5.0,
            max_distortion_factor: 0.1,
            significant_change_factor: 0.5,
            gap_search_factor: 50.0,
            gap_buffer_factor: 2.0,
            gap_segment_factor: 5.0,
            workers: None,
            pair_strategy: PairStrategy::AllPairs,
            snap_targets: SnapTargets::AllNeighbors,
        }
    }
}

impl CleanConfig {
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    #[inline]
    pub fn tol(&self) -> f64 {
        self.tolerance.degrees()
    }

    pub fn cell_size(&self) -> f64 {
        self.tol() * self.cell_size_factor
    }

    pub fn neighbor_search_distance(&self) -> f64 {
        self.tol() * self.neighbor_search_factor
    }

    pub fn max_distortion(&self) -> f64 {
        self.tol() * self.max_distortion_factor
    }

    pub fn significant_change_threshold(&self) -> f64 {
        self.tol() * self.significant_change_factor
    }

    pub fn gap_search_distance(&self) -> f64 {
        self.tol() * self.gap_search_factor
    }

    pub fn gap_buffer_distance(&self) -> f64 {
        self.tol() * self.gap_buffer_factor
    }

    pub fn gap_segment_length(&self) -> f64 {
        self.tol() * self.gap_segment_factor
    }

    /// Areas below this are noise for both overlap and gap detection.
    pub fn area_threshold(&self) -> f64 {
        self.tol() * self.tol()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_conversions() {
        assert!((Tolerance::from_precision(7).degrees() - 1e-6).abs() < 1e-18);
        assert!((Tolerance::from_meters(111.0).degrees() - 0.001).abs() < 1e-15);
        assert_eq!(Tolerance::default(), Tolerance::from_meters(0.4));
    }

    #[test]
    fn derived_thresholds_scale_with_tolerance() {
        let config = CleanConfig::default().with_tolerance(Tolerance::from_degrees(0.01));
        assert!((config.cell_size() - 1.0).abs() < 1e-12);
        assert!((config.neighbor_search_distance() - 0.05).abs() < 1e-12);
        assert!((config.max_distortion() - 0.001).abs() < 1e-12);
        assert!((config.significant_change_threshold() - 0.005).abs() < 1e-12);
        assert!((config.gap_search_distance() - 0.5).abs() < 1e-12);
        assert!((config.gap_buffer_distance() - 0.02).abs() < 1e-12);
        assert!((config.gap_segment_length() - 0.05).abs() < 1e-12);
        assert!((config.area_threshold() - 1e-4).abs() < 1e-16);
    }

    #[test]
    fn snap_targets_filter_by_index() {
        assert!(SnapTargets::AllNeighbors.admits(1, 2));
        assert!(SnapTargets::LowerIndexOnly.admits(2, 1));
        assert!(!SnapTargets::LowerIndexOnly.admits(1, 2));
        assert_eq!(CleanConfig::default().snap_targets, SnapTargets::AllNeighbors);
    }
}
