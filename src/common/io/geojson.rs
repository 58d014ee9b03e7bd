use std::{fs, io::{BufWriter, Write}, path::Path};

use anyhow::{bail, Context, Result};
use geo::{LineString, MultiPolygon, Polygon};
use geojson::{feature::Id, GeoJson};
use serde_json::{json, Map, Value};

use crate::{common::PolygonFeatures, geom::Crs};

/// Render a JSON scalar as an identifier string.
fn json_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read Polygon/MultiPolygon features from a GeoJSON file.
/// Features with other geometry kinds (or none) are skipped with a warning.
pub(crate) fn read_geojson_polygons(path: &Path, id_field: &str) -> Result<PolygonFeatures> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read GeoJSON file: {}", path.display()))?;
    let geojson: GeoJson = text.parse()
        .with_context(|| format!("Failed to parse GeoJSON file: {}", path.display()))?;

    let (features, foreign_members) = match geojson {
        GeoJson::FeatureCollection(fc) => (fc.features, fc.foreign_members),
        GeoJson::Feature(feature) => (vec![feature], None),
        GeoJson::Geometry(_) => bail!("expected a FeatureCollection, found a bare geometry in {}", path.display()),
    };

    // RFC 7946 data is WGS 84 unless a legacy named `crs` says otherwise.
    let crs = foreign_members.as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs["properties"]["name"].as_str())
        .map(Crs::from_urn)
        .unwrap_or_else(Crs::wgs84);

    let mut ids = Vec::with_capacity(features.len());
    let mut shapes = Vec::with_capacity(features.len());
    for (idx, feature) in features.into_iter().enumerate() {
        let id = feature.property(id_field)
            .and_then(json_to_id)
            .or_else(|| match &feature.id {
                Some(Id::String(s)) => Some(s.clone()),
                Some(Id::Number(n)) => Some(n.to_string()),
                None => None,
            });

        let Some(geometry) = feature.geometry else {
            log::warn!("feature {idx} in {} has no geometry; skipping", path.display());
            continue;
        };
        let shape = match geo::Geometry::<f64>::try_from(geometry)
            .with_context(|| format!("invalid geometry in feature {idx} of {}", path.display()))?
        {
            geo::Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
            geo::Geometry::MultiPolygon(mp) => mp,
            _ => {
                log::warn!("feature {idx} in {} is not a polygon; skipping", path.display());
                continue;
            }
        };

        ids.push(id);
        shapes.push(shape);
    }

    Ok(PolygonFeatures { ids, shapes, crs })
}

fn ring_coords(ring: &LineString<f64>) -> Vec<[f64; 2]> {
    ring.coords().map(|c| [c.x, c.y]).collect()
}

fn polygon_coords(polygon: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_coords)
        .collect()
}

/// GeoJSON geometry for a MultiPolygon; single-part shapes are written as a Polygon.
pub(crate) fn multipolygon_to_geojson(mp: &MultiPolygon<f64>) -> Value {
    match mp.0.as_slice() {
        [polygon] => json!({
            "type": "Polygon",
            "coordinates": polygon_coords(polygon),
        }),
        polygons => json!({
            "type": "MultiPolygon",
            "coordinates": polygons.iter().map(polygon_coords).collect::<Vec<_>>(),
        }),
    }
}

/// GeoJSON geometry for a LineString.
pub(crate) fn linestring_to_geojson(line: &LineString<f64>) -> Value {
    json!({
        "type": "LineString",
        "coordinates": ring_coords(line),
    })
}

/// Build a FeatureCollection from (geometry, properties) pairs.
/// A legacy named `crs` member is added when the CRS has an EPSG code other than 4326.
pub(crate) fn feature_collection(features: impl IntoIterator<Item = (Value, Map<String, Value>)>, crs: &Crs) -> Value {
    let features: Vec<Value> = features.into_iter()
        .map(|(geometry, properties)| json!({
            "type": "Feature",
            "properties": properties,
            "geometry": geometry,
        }))
        .collect();

    let mut collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    if let Some(code) = crs.epsg().filter(|&code| code != 4326) {
        collection["crs"] = json!({
            "type": "name",
            "properties": { "name": format!("urn:ogc:def:crs:EPSG::{code}") },
        });
    }
    collection
}

/// Write a GeoJSON value to `path`.
pub(crate) fn write_geojson_file(path: &Path, value: &Value) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("Failed to serialize GeoJSON to {}", path.display()))?;
    writer.flush()
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, polygon};

    #[test]
    fn reads_polygons_with_property_ids_and_crs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prodes.geojson");
        fs::write(&path, r#"{
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::4674" } },
            "features": [
                { "type": "Feature", "properties": { "uuid": "r-1" },
                  "geometry": { "type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]] } },
                { "type": "Feature", "id": 42, "properties": {},
                  "geometry": { "type": "MultiPolygon", "coordinates": [[[[2,2],[3,2],[3,3],[2,2]]]] } },
                { "type": "Feature", "properties": { "uuid": "r-3" },
                  "geometry": { "type": "Point", "coordinates": [5, 5] } }
            ]
        }"#).unwrap();

        let contents = read_geojson_polygons(&path, "uuid").unwrap();
        assert_eq!(contents.ids, vec![Some("r-1".to_string()), Some("42".to_string())]);
        assert_eq!(contents.shapes.len(), 2);
        assert_eq!(contents.crs.epsg(), Some(4674));
    }

    #[test]
    fn crs_defaults_to_wgs84() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.geojson");
        fs::write(&path, r#"{"type":"FeatureCollection","features":[]}"#).unwrap();
        assert_eq!(read_geojson_polygons(&path, "uuid").unwrap().crs, Crs::wgs84());
    }

    #[test]
    fn single_part_shapes_are_polygons() {
        let square = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        let one = multipolygon_to_geojson(&MultiPolygon(vec![square.clone()]));
        assert_eq!(one["type"], "Polygon");
        assert_eq!(one["coordinates"][0][0], json!([0.0, 0.0]));

        let two = multipolygon_to_geojson(&MultiPolygon(vec![square.clone(), square]));
        assert_eq!(two["type"], "MultiPolygon");
        assert_eq!(two["coordinates"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn collection_carries_named_crs_only_when_not_wgs84() {
        let line = line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)];
        let features = vec![(linestring_to_geojson(&line), Map::new())];

        let sirgas = feature_collection(features.clone(), &Crs::from_epsg(4674));
        assert_eq!(sirgas["crs"]["properties"]["name"], "urn:ogc:def:crs:EPSG::4674");
        assert_eq!(sirgas["features"][0]["geometry"]["type"], "LineString");

        let wgs84 = feature_collection(features, &Crs::wgs84());
        assert!(wgs84.get("crs").is_none());
    }
}
