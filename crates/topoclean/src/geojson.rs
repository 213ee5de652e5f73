//! GeoJSON feature collections in and out.
//!
//! Only the members the cleaner needs are modelled. `properties` and `id`
//! are kept as raw JSON so they round-trip untouched, key order included.

use crate::error::{CleanError, GeometryError};
use crate::kernel::{Geom, GeomKind};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    fn type_name() -> String {
        "FeatureCollection".to_owned()
    }

    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: Self::type_name(),
            features,
        }
    }
}

/// Decode a request payload. Anything but a FeatureCollection with a
/// `features` array is rejected as a whole.
pub fn parse_collection(payload: &str) -> Result<FeatureCollection, CleanError> {
    if payload.trim().is_empty() {
        return Err(CleanError::EmptyPayload);
    }
    let collection: FeatureCollection = serde_json::from_str(payload)?;
    if collection.kind != "FeatureCollection" {
        return Err(CleanError::NotAFeatureCollection(collection.kind));
    }
    Ok(collection)
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default = "Feature::type_name")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub geometry: Value,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

impl Feature {
    fn type_name() -> String {
        "Feature".to_owned()
    }

    pub fn new(geometry: &Geom, properties: Option<Map<String, Value>>, id: Option<Value>) -> Self {
        Self {
            kind: Self::type_name(),
            id,
            geometry: geometry_to_value(geometry),
            properties,
        }
    }
}

/// Decode a GeoJSON geometry object into a kernel geometry.
///
/// Only `Polygon` and `MultiPolygon` are accepted. Positions may carry a third
/// ordinate, which is ignored.
pub fn parse_geometry(value: &Value) -> Result<Geom, GeometryError> {
    let object = match value {
        Value::Null => return Err(GeometryError::NullGeometry),
        Value::Object(object) => object,
        other => {
            return Err(GeometryError::InvalidCoordinates(format!(
                "geometry must be an object, got {other}"
            )))
        }
    };

    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| GeometryError::InvalidCoordinates("geometry without a type".into()))?;
    let coordinates = object.get("coordinates").unwrap_or(&Value::Null);

    let geom = match kind {
        "Polygon" => Geom::polygon(parse_polygon(coordinates)?),
        "MultiPolygon" => {
            let mut parts = as_array(coordinates, "MultiPolygon coordinates")?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>, _>>()?;
            // A part without a shell has nothing to contribute.
            parts.retain(|p| !p.exterior().0.is_empty());
            Geom::multi_polygon(MultiPolygon::new(parts))
        }
        other => return Err(GeometryError::UnsupportedType(other.to_owned())),
    };

    if geom.is_empty() {
        return Err(GeometryError::EmptyGeometry);
    }
    Ok(geom)
}

/// Encode a kernel geometry as a GeoJSON geometry object of its declared kind.
pub fn geometry_to_value(g: &Geom) -> Value {
    match g.kind() {
        GeomKind::Polygon => {
            let coordinates = g.part(0).map(polygon_coordinates).unwrap_or_default();
            json!({ "type": "Polygon", "coordinates": coordinates })
        }
        GeomKind::MultiPolygon => {
            let coordinates: Vec<Value> = g
                .polygons()
                .iter()
                .map(|p| Value::Array(polygon_coordinates(p)))
                .collect();
            json!({ "type": "MultiPolygon", "coordinates": coordinates })
        }
    }
}

fn polygon_coordinates(p: &Polygon<f64>) -> Vec<Value> {
    std::iter::once(p.exterior())
        .chain(p.interiors().iter())
        .map(|ring| {
            Value::Array(ring.0.iter().map(|c| json!([c.x, c.y])).collect())
        })
        .collect()
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>, GeometryError> {
    let mut rings = as_array(value, "Polygon coordinates")?
        .iter()
        .map(parse_ring)
        .collect::<Result<Vec<_>, _>>()?;
    if rings.is_empty() {
        return Ok(Polygon::new(LineString::new(Vec::new()), Vec::new()));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

fn parse_ring(value: &Value) -> Result<LineString<f64>, GeometryError> {
    as_array(value, "linear ring")?
        .iter()
        .map(parse_position)
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn parse_position(value: &Value) -> Result<Coord<f64>, GeometryError> {
    let ordinates = as_array(value, "position")?;
    match (
        ordinates.first().and_then(Value::as_f64),
        ordinates.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(GeometryError::InvalidCoordinates(format!(
            "position needs two numbers, got {value}"
        ))),
    }
}

fn as_array<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>, GeometryError> {
    value
        .as_array()
        .ok_or_else(|| GeometryError::InvalidCoordinates(format!("{what} must be an array")))
}
