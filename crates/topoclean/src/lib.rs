//! topoclean: topology cleaning for polygon parcels delivered as GeoJSON.
//!
//! - Repairs invalid Polygon/MultiPolygon topology (make-valid, collapsed
//!   fragments dropped).
//! - Closes micro-gaps between neighbours by snapping each record onto its
//!   neighbours in index order, keeping only snaps whose distortion stays in
//!   budget.
//! - Truncates coordinates to a fixed number of decimals (default 7).
//! - Audits the result: pairwise overlaps and near-miss gaps, and how far
//!   every geometry moved from its input.
//!
//! Pipeline (one run, stages strictly sequential):
//!   parse -> grid index -> snap -> validate/repair/truncate
//!         -> coverage audit -> preservation audit -> serialize
//!
//! Distances are in degrees. With the default 0.4 m tolerance
//! (0.4 / 111000 deg) the derived thresholds are:
//!   snap search radius      tol * 5
//!   distortion budget       tol * 0.1
//!   significant change      tol * 0.5
//!   gap window              [tol, tol * 50]
//!   gap buffer              tol * 2
//!   overlap/gap area floor  tol^2
//!   grid cell               tol * 100
//!
//! Every factor is a field of [`CleanConfig`].

pub mod config;
pub mod coverage;
pub mod error;
pub mod executor;
pub mod geojson;
pub mod grid;
pub mod kernel;
pub mod ops;
pub mod pipeline;
pub mod preservation;
pub mod snap;
pub mod truncate;

pub use config::{CleanConfig, PairStrategy, SnapTargets, Tolerance};
pub use coverage::CoverageReport;
pub use error::{CleanError, GeometryError};
pub use executor::{BatchExecutor, LogProgress, ProgressObserver};
pub use geojson::{Feature, FeatureCollection};
pub use kernel::{Geom, GeomKind};
pub use pipeline::{CleanOutcome, CleanReport, GeometryRecord, StageStats, TopologyCleaner};
pub use preservation::PreservationReport;
