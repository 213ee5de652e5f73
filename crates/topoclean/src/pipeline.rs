//! Topology cleaning pipeline.
//!
//! Stages run strictly one after another, each fully materialized:
//! parse, index, snap, validate and repair, coverage audit, preservation
//! audit, serialize. Only request-level problems abort a run; anything that
//! goes wrong with a single feature is logged and counted.

use crate::config::CleanConfig;
use crate::coverage::{validate_coverage, CoverageReport};
use crate::error::CleanError;
use crate::executor::BatchExecutor;
use crate::geojson::{parse_collection, parse_geometry, Feature, FeatureCollection};
use crate::grid::SpatialGrid;
use crate::kernel::{self, Geom};
use crate::preservation::{audit_preservation, PreservationReport};
use crate::snap::{SnapOutcome, SnapPolicy};
use crate::truncate::truncate_geometry;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// One input feature on its way through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRecord {
    /// Position in the input feature list.
    pub index: usize,
    /// `None` once a stage discarded the geometry.
    pub geometry: Option<Geom>,
    pub properties: Option<Map<String, Value>>,
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStats {
    pub input_features: usize,
    pub parsed: usize,
    pub skipped: usize,
    pub snapped: usize,
    pub repaired: usize,
    pub truncation_failures: usize,
    pub output_features: usize,
}

/// Everything a run reports besides the cleaned features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanReport {
    pub coverage: CoverageReport,
    pub preservation: PreservationReport,
    pub stats: StageStats,
}

#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub collection: FeatureCollection,
    pub coverage: CoverageReport,
    pub preservation: PreservationReport,
    pub stats: StageStats,
}

impl CleanOutcome {
    pub fn report(&self) -> CleanReport {
        CleanReport {
            coverage: self.coverage,
            preservation: self.preservation,
            stats: self.stats,
        }
    }
}

pub struct TopologyCleaner {
    config: CleanConfig,
    executor: BatchExecutor,
}

impl TopologyCleaner {
    pub fn new(config: CleanConfig) -> Result<Self, CleanError> {
        let executor = BatchExecutor::new(config.workers)?;
        Ok(Self::with_executor(config, executor))
    }

    pub fn with_executor(config: CleanConfig, executor: BatchExecutor) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &CleanConfig {
        &self.config
    }

    pub fn executor(&self) -> &BatchExecutor {
        &self.executor
    }

    /// Clean a raw GeoJSON FeatureCollection payload.
    pub fn clean_str(&self, payload: &str) -> Result<CleanOutcome, CleanError> {
        info!("payload of {} bytes", payload.len());
        let collection = parse_collection(payload)?;
        self.clean(collection)
    }

    /// Clean a decoded collection. Panics inside any stage are caught here and
    /// reported as [`CleanError::Internal`].
    pub fn clean(&self, collection: FeatureCollection) -> Result<CleanOutcome, CleanError> {
        guarded(|| self.run(collection))
    }

    fn run(&self, collection: FeatureCollection) -> CleanOutcome {
        let started = Instant::now();
        let tol = self.config.tol();
        let mut stats = StageStats {
            input_features: collection.features.len(),
            ..StageStats::default()
        };
        info!(
            "cleaning {} features, tolerance {tol:e} degrees, {} workers",
            stats.input_features,
            self.executor.workers()
        );

        let records = self.parse(collection.features, &mut stats);

        let grid = self.build_grid(&records);

        let snapped = self.snap(&records, &grid, &mut stats);
        drop(grid);

        let validated = self.validate_and_repair(&records, snapped, &mut stats);

        let cleaned: Vec<Option<&Geom>> = validated.iter().map(Option::as_ref).collect();
        let coverage = validate_coverage(&cleaned, &self.config, &self.executor);

        let original: Vec<Option<&Geom>> = records.iter().map(|r| r.geometry.as_ref()).collect();
        let preservation = audit_preservation(
            &original,
            &cleaned,
            self.config.significant_change_threshold(),
        );

        let features: Vec<Feature> = records
            .into_iter()
            .zip(validated)
            .filter_map(|(record, geometry)| {
                geometry.map(|g| Feature::new(&g, record.properties, record.id))
            })
            .collect();
        stats.output_features = features.len();

        info!(
            "cleaning done in {:.2?}: {} in, {} out, {} snapped, {} repaired",
            started.elapsed(),
            stats.input_features,
            stats.output_features,
            stats.snapped,
            stats.repaired
        );

        CleanOutcome {
            collection: FeatureCollection::new(features),
            coverage,
            preservation,
            stats,
        }
    }

    /// Keep the features whose geometry is a non-empty Polygon or
    /// MultiPolygon.
    fn parse(&self, features: Vec<Feature>, stats: &mut StageStats) -> Vec<GeometryRecord> {
        let jobs: Vec<(usize, Feature)> = features.into_iter().enumerate().collect();
        let results = self.executor.process("parse", jobs, |(index, feature)| {
            match parse_geometry(&feature.geometry) {
                Ok(geometry) => Ok(GeometryRecord {
                    index,
                    geometry: Some(geometry),
                    properties: feature.properties,
                    id: feature.id,
                }),
                Err(err) => Err((index, err)),
            }
        });

        let mut records = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(record) => records.push(record),
                Err((index, err)) => {
                    stats.skipped += 1;
                    warn!("feature {index}: skipped, {err}");
                }
            }
        }
        stats.parsed = records.len();
        info!("parse: {} polygonal features, {} skipped", stats.parsed, stats.skipped);
        records
    }

    fn build_grid<'a>(&self, records: &'a [GeometryRecord]) -> SpatialGrid<'a> {
        let mut grid = SpatialGrid::new(self.config.cell_size());
        let mut indexed = 0;
        for record in records {
            if let Some(geometry) = &record.geometry {
                if grid.insert(geometry, record.index, record.properties.as_ref()) {
                    indexed += 1;
                }
            }
        }
        info!(
            "index: {indexed} geometries in {} cells of {:e} degrees",
            grid.cell_count(),
            grid.cell_size()
        );
        grid
    }

    /// Fold the snap policy over each record's neighbors in ascending index
    /// order. Neighbors are read from the parsed geometries, so the outcome
    /// does not depend on scheduling. Returns the new geometry per record, in
    /// record order.
    fn snap(
        &self,
        records: &[GeometryRecord],
        grid: &SpatialGrid<'_>,
        stats: &mut StageStats,
    ) -> Vec<Option<Geom>> {
        let policy = SnapPolicy::new(self.config.tol(), self.config.max_distortion());
        let search = self.config.neighbor_search_distance();
        let targets = self.config.snap_targets;

        let jobs: Vec<&GeometryRecord> = records.iter().collect();
        let results = self.executor.process("snap", jobs, |record| {
            let Some(geometry) = &record.geometry else {
                return (None, false);
            };

            let mut current = geometry.clone();
            let mut moved = false;
            for neighbor in grid.find_neighbors(geometry, search, Some(record.index)) {
                if !targets.admits(record.index, neighbor.index) {
                    continue;
                }

                let outcome = policy.try_snap(current, neighbor.geometry);
                match &outcome {
                    SnapOutcome::Accepted { distortion, .. } => debug!(
                        "record {}: snapped onto {} (distortion {distortion:e})",
                        record.index, neighbor.index
                    ),
                    SnapOutcome::Rejected { reason, .. } => debug!(
                        "record {}: snap onto {} rejected, {reason:?}",
                        record.index, neighbor.index
                    ),
                }
                moved |= outcome.is_accepted();
                current = outcome.into_geometry();
            }
            (Some(current), moved)
        });

        let mut out = Vec::with_capacity(results.len());
        for (geometry, moved) in results {
            if moved {
                stats.snapped += 1;
            }
            out.push(geometry);
        }
        info!("snap: {} of {} geometries moved", stats.snapped, records.len());
        out
    }

    /// Repair invalid geometries, then truncate coordinates.
    fn validate_and_repair(
        &self,
        records: &[GeometryRecord],
        snapped: Vec<Option<Geom>>,
        stats: &mut StageStats,
    ) -> Vec<Option<Geom>> {
        let precision = self.config.precision;
        let jobs: Vec<(usize, Option<Geom>)> = records
            .iter()
            .map(|r| r.index)
            .zip(snapped)
            .collect();

        let results = self.executor.process("validate", jobs, |(index, geometry)| {
            repair_and_truncate(index, geometry, precision)
        });

        let mut out = Vec::with_capacity(results.len());
        for result in results {
            if result.repaired {
                stats.repaired += 1;
            }
            if result.truncation_failed {
                stats.truncation_failures += 1;
            }
            out.push(result.geometry);
        }
        info!(
            "validate: {} repaired, {} truncation failures",
            stats.repaired, stats.truncation_failures
        );
        out
    }
}

struct Repaired {
    geometry: Option<Geom>,
    repaired: bool,
    truncation_failed: bool,
}

fn repair_and_truncate(index: usize, geometry: Option<Geom>, precision: u32) -> Repaired {
    let Some(mut geometry) = geometry else {
        return Repaired {
            geometry: None,
            repaired: false,
            truncation_failed: false,
        };
    };

    let mut repaired = false;
    if let Some(reason) = kernel::validity_reason(&geometry) {
        debug!("record {index}: invalid, {reason}");
        match kernel::make_valid(&geometry) {
            Some(fixed) => {
                geometry = fixed;
                repaired = true;
            }
            None => {
                warn!("record {index}: nothing left after repair, dropped");
                return Repaired {
                    geometry: None,
                    repaired: true,
                    truncation_failed: false,
                };
            }
        }
    }

    match truncate_geometry(Some(&geometry), precision) {
        Ok(truncated) => Repaired {
            geometry: Some(truncated),
            repaired,
            truncation_failed: false,
        },
        Err(err) => {
            warn!("record {index}: truncation failed, keeping repaired geometry: {err}");
            Repaired {
                geometry: Some(geometry),
                repaired,
                truncation_failed: true,
            }
        }
    }
}

/// Run `f`, turning a panic into [`CleanError::Internal`].
pub(crate) fn guarded<T>(f: impl FnOnce() -> T) -> Result<T, CleanError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_owned());
        error!("pipeline panicked: {message}");
        CleanError::Internal(message)
    })
}
