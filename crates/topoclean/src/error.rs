use thiserror::Error;

/// Request-level failure. Anything reported here aborts the whole run.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("empty payload")]
    EmptyPayload,

    #[error("malformed GeoJSON: {0}")]
    MalformedInput(#[from] serde_json::Error),

    #[error("expected a FeatureCollection, got {0:?}")]
    NotAFeatureCollection(String),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Per-feature failure. The feature is skipped or kept as it was, the run
/// goes on.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("nil geometry")]
    NilGeometry,

    #[error("no valid geometry after truncation")]
    NoValidGeometry,

    #[error("feature has null geometry")]
    NullGeometry,

    #[error("unsupported geometry type {0:?}")]
    UnsupportedType(String),

    #[error("empty geometry")]
    EmptyGeometry,

    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("cannot decode geometry: {0}")]
    Decode(#[source] serde_json::Error),
}
