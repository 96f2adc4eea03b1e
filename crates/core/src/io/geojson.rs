//! GeoJSON region sources

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::region::{AttributeValue, Region, RegionSchema, RegionSet};
use geo_types::{Geometry, MultiPolygon};
use geojson::GeoJson;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Read a GeoJSON FeatureCollection into a RegionSet.
///
/// The schema's name field is resolved once against the first feature.
/// Features without a usable polygon geometry or without the resolved name
/// field are skipped with a warning; loading continues for the rest.
pub fn read_regions_geojson<P: AsRef<Path>>(path: P, schema: &RegionSchema) -> Result<RegionSet> {
    let source_name = path.as_ref().display().to_string();
    let text = fs::read_to_string(path.as_ref())?;
    parse_regions(&text, &source_name, schema)
}

/// Parse GeoJSON text into a RegionSet. `source_name` labels errors and logs.
pub fn parse_regions(text: &str, source_name: &str, schema: &RegionSchema) -> Result<RegionSet> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e| Error::Other(format!("GeoJSON parse error in {}: {}", source_name, e)))?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => {
            return Err(Error::InvalidParameter {
                name: "source",
                value: source_name.to_string(),
                reason: "expected a GeoJSON FeatureCollection".to_string(),
            })
        }
    };

    let first = collection.features.first().ok_or_else(|| Error::InvalidParameter {
        name: "source",
        value: source_name.to_string(),
        reason: "FeatureCollection has no features".to_string(),
    })?;

    let first_keys: Vec<&str> = first
        .properties
        .as_ref()
        .map(|p| p.keys().map(String::as_str).collect())
        .unwrap_or_default();
    let resolved = schema.resolve(source_name, first_keys)?;

    let mut regions = Vec::new();
    for (idx, feature) in collection.features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            warn!(source = source_name, feature = idx, "skipping feature without geometry");
            continue;
        };

        let geom: Geometry<f64> = match geometry.try_into() {
            Ok(g) => g,
            Err(e) => {
                warn!(
                    source = source_name,
                    feature = idx,
                    error = %e,
                    "skipping feature with unreadable geometry"
                );
                continue;
            }
        };

        let multi = match geom {
            Geometry::MultiPolygon(mp) => mp,
            Geometry::Polygon(p) => MultiPolygon(vec![p]),
            _ => {
                warn!(source = source_name, feature = idx, "skipping non-polygon feature");
                continue;
            }
        };

        let properties = feature.properties.unwrap_or_default();
        let name = match properties.get(&resolved.name_field).and_then(json_str) {
            Some(name) if !name.is_empty() => name,
            _ => {
                warn!(
                    source = source_name,
                    feature = idx,
                    field = %resolved.name_field,
                    "skipping feature without a name"
                );
                continue;
            }
        };

        let mut region = Region::new(name, resolved.level, multi);
        if let Some(code_field) = &resolved.code_field {
            region.set_code(properties.get(code_field).and_then(json_str));
        }
        for (key, value) in &properties {
            region.set_property(key.clone(), attr_from_json(value));
        }

        regions.push(region);
    }

    // RFC 7946 fixes GeoJSON coordinates to WGS 84.
    let mut set = RegionSet::new(schema.level(), regions)?;
    set.set_crs(Some(CRS::wgs84()));
    Ok(set)
}

/// String view of a JSON property value (numbers are rendered)
fn json_str(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn attr_from_json(value: &JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                AttributeValue::Int(i)
            } else {
                AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        JsonValue::String(s) => AttributeValue::String(s.clone()),
        // Arrays and objects are carried as their JSON text
        other => AttributeValue::String(other.to_string()),
    }
}
