//! Single-pass operations next to the full cleaning pipeline: a validity
//! report, per-feature repair without snapping, and dissolving everything
//! into one geometry.

use crate::error::{CleanError, GeometryError};
use crate::executor::BatchExecutor;
use crate::geojson::{parse_geometry, Feature, FeatureCollection};
use crate::kernel::{self, Geom};
use crate::truncate::truncate_geometry;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One invalid entry of a checked collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryIssue {
    #[serde(rename = "ref")]
    pub reference: usize,
    #[serde(rename = "errorMessage")]
    pub error_message: String,
}

/// Split a GeoJSON document into the geometries it holds.
///
/// A FeatureCollection yields one entry per feature, a GeometryCollection one
/// per member, a MultiPolygon one per part, and a Feature or Polygon itself.
pub fn collect_geometries(value: &Value) -> Result<Vec<Result<Geom, GeometryError>>, CleanError> {
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    let members = |key: &str| -> Vec<Value> {
        value
            .get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    };

    let items = match kind {
        "FeatureCollection" => members("features")
            .iter()
            .map(|f| parse_geometry(f.get("geometry").unwrap_or(&Value::Null)))
            .collect(),
        "GeometryCollection" => members("geometries").iter().map(parse_geometry).collect(),
        "Feature" => vec![parse_geometry(value.get("geometry").unwrap_or(&Value::Null))],
        "MultiPolygon" => match parse_geometry(value) {
            Ok(multi) => multi
                .polygons()
                .iter()
                .cloned()
                .map(|p| Ok(Geom::polygon(p)))
                .collect(),
            Err(err) => vec![Err(err)],
        },
        "" => return Err(CleanError::EmptyPayload),
        _ => vec![parse_geometry(value)],
    };
    Ok(items)
}

/// Validity report: one issue per entry that failed to parse or is invalid.
pub fn check_geometry(items: &[Result<Geom, GeometryError>]) -> Vec<GeometryIssue> {
    info!("checking {} geometries", items.len());
    items
        .iter()
        .enumerate()
        .filter_map(|(reference, item)| {
            let error_message = match item {
                Ok(g) => kernel::validity_reason(g)?.to_string(),
                Err(err) => err.to_string(),
            };
            Some(GeometryIssue {
                reference,
                error_message,
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixStats {
    pub input_features: usize,
    pub repaired: usize,
    pub truncation_failures: usize,
    pub dropped: usize,
}

/// Repair and truncate every feature on its own. Features that are not
/// polygonal, or that repair reduces to nothing, are dropped.
pub fn fix_features(
    collection: FeatureCollection,
    precision: u32,
    executor: &BatchExecutor,
) -> (FeatureCollection, FixStats) {
    let mut stats = FixStats {
        input_features: collection.features.len(),
        ..FixStats::default()
    };

    let jobs: Vec<(usize, Feature)> = collection.features.into_iter().enumerate().collect();
    let results = executor.process("fix", jobs, |(index, feature)| {
        let geometry = match parse_geometry(&feature.geometry) {
            Ok(g) => g,
            Err(err) => {
                warn!("feature {index}: dropped, {err}");
                return None;
            }
        };
        let fixed = fix_geometry(index, geometry, precision)?;
        Some((
            Feature::new(&fixed.geometry, feature.properties, feature.id),
            fixed,
        ))
    });

    let mut features = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Some((feature, fixed)) => {
                stats.repaired += usize::from(fixed.repaired);
                stats.truncation_failures += usize::from(fixed.truncation_failed);
                features.push(feature);
            }
            None => stats.dropped += 1,
        }
    }
    info!(
        "fix: {} features, {} repaired, {} dropped",
        stats.input_features, stats.repaired, stats.dropped
    );
    (FeatureCollection::new(features), stats)
}

#[derive(Debug)]
struct Fixed {
    geometry: Geom,
    repaired: bool,
    truncation_failed: bool,
}

/// Make valid, truncate, and make valid once more if rounding broke it.
fn fix_geometry(index: usize, geometry: Geom, precision: u32) -> Option<Fixed> {
    let mut geometry = geometry;
    let mut repaired = false;

    if let Some(reason) = kernel::validity_reason(&geometry) {
        debug!("feature {index}: {reason}");
        geometry = kernel::make_valid(&geometry)?;
        repaired = true;
    }

    let mut truncation_failed = false;
    match truncate_geometry(Some(&geometry), precision) {
        Ok(truncated) => geometry = truncated,
        Err(err) => {
            warn!("feature {index}: truncation failed: {err}");
            truncation_failed = true;
        }
    }

    if !kernel::is_valid(&geometry) {
        if let Some(again) = kernel::make_valid(&geometry) {
            geometry = again;
            repaired = true;
        }
    }

    Some(Fixed {
        geometry,
        repaired,
        truncation_failed,
    })
}

/// Union every geometry into one, after repairing each.
pub fn dissolve(geometries: Vec<Geom>, precision: u32) -> Result<Geom, GeometryError> {
    let total = geometries.len();
    let repaired: Vec<_> = geometries
        .iter()
        .filter_map(kernel::make_valid)
        .map(Geom::into_shape)
        .collect();
    info!("dissolve: {} of {} geometries usable", repaired.len(), total);

    let merged = kernel::cascaded_union(repaired).ok_or(GeometryError::NoValidGeometry)?;
    let union = Geom::from_parts(merged.0).ok_or(GeometryError::NoValidGeometry)?;

    let truncated = match truncate_geometry(Some(&union), precision) {
        Ok(t) => t,
        Err(err) => {
            warn!("dissolve: truncation failed, keeping the raw union: {err}");
            union
        }
    };

    if kernel::is_valid(&truncated) {
        return Ok(truncated);
    }
    kernel::make_valid(&truncated).ok_or(GeometryError::NoValidGeometry)
}
