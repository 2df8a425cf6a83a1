use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use geojson::{Feature, GeoJson};
use tracing::{info, instrument};

use super::KeyedTable;
use crate::constants::{GEO_COUNTYFP, GEO_GEOID, GEO_NAME, GEO_STATEFP};
use crate::error::LoadError;
use crate::types::{CountyCode, SourceKind};

/// County boundary in longitude/latitude degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryRow {
    pub name: Option<String>,
    pub shape: MultiPolygon<f64>,
}

/// Load county boundaries from a GeoJSON FeatureCollection.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_geometry(path: &Path) -> Result<KeyedTable<GeometryRow>, LoadError> {
    let dataset = SourceKind::Geometry;
    let text = fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => LoadError::NotFound {
            dataset,
            path: path.to_path_buf(),
        },
        _ => LoadError::Io {
            dataset,
            path: path.to_path_buf(),
            err,
        },
    })?;

    let table = parse_geometry(&text)?;
    info!("Loaded {} county boundaries", table.len());
    Ok(table)
}

pub(crate) fn parse_geometry(text: &str) -> Result<KeyedTable<GeometryRow>, LoadError> {
    let dataset = SourceKind::Geometry;
    let geojson = text.parse::<GeoJson>().map_err(|err| LoadError::Malformed {
        dataset,
        message: err.to_string(),
    })?;

    let collection = match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        _ => {
            return Err(LoadError::Malformed {
                dataset,
                message: "expected a FeatureCollection".to_string(),
            })
        }
    };

    let mut table = KeyedTable::new(dataset);
    for (i, feature) in collection.features.iter().enumerate() {
        let line = i + 1;
        let code = feature_code(feature).ok_or_else(|| LoadError::InvalidCode {
            dataset,
            row: line,
            value: property_text(feature, GEO_GEOID).unwrap_or_default(),
        })?;

        let geometry = feature.geometry.as_ref().ok_or_else(|| LoadError::Malformed {
            dataset,
            message: format!("feature {code} has no geometry"),
        })?;
        let shape = to_multi_polygon(&geometry.value).ok_or_else(|| LoadError::Malformed {
            dataset,
            message: format!("feature {code} is not a valid Polygon or MultiPolygon"),
        })?;

        table.insert(
            code,
            GeometryRow {
                name: property_text(feature, GEO_NAME),
                shape,
            },
        )?;
    }

    Ok(table)
}

/// `GEOID` when present, otherwise `STATEFP` + `COUNTYFP`.
fn feature_code(feature: &Feature) -> Option<CountyCode> {
    match property_text(feature, GEO_GEOID) {
        Some(geoid) => CountyCode::parse(&geoid),
        None => CountyCode::from_parts(
            &property_text(feature, GEO_STATEFP)?,
            &property_text(feature, GEO_COUNTYFP)?,
        ),
    }
}

fn property_text(feature: &Feature, key: &str) -> Option<String> {
    match feature.property(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_multi_polygon(value: &geojson::Value) -> Option<MultiPolygon<f64>> {
    match value {
        geojson::Value::Polygon(rings) => Some(MultiPolygon::new(vec![to_polygon(rings)?])),
        geojson::Value::MultiPolygon(polygons) => polygons
            .iter()
            .map(|rings| to_polygon(rings))
            .collect::<Option<Vec<_>>>()
            .map(MultiPolygon::new),
        _ => None,
    }
}

fn to_polygon(rings: &[Vec<Vec<f64>>]) -> Option<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| to_line_string(ring));
    let exterior = rings.next()??;
    let interiors = rings.collect::<Option<Vec<_>>>()?;
    Some(Polygon::new(exterior, interiors))
}

fn to_line_string(ring: &[Vec<f64>]) -> Option<LineString<f64>> {
    ring.iter()
        .map(|position| match position.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Some(Coord { x: *x, y: *y }),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(LineString::new)
}
