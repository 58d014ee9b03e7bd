use std::path::Path;

use ahash::AHashMap;
use anyhow::{anyhow, bail, ensure, Context, Result};
use geo::MultiPolygon;

use crate::{common, geom::Crs, DriftError};

/// The reference (deforestation) polygons, reprojected into the analysis CRS.
pub struct ReferenceLayer {
    ids: Vec<String>,
    geoms: Vec<MultiPolygon<f64>>,
    index: AHashMap<String, usize>,
    crs: Crs,
}

impl ReferenceLayer {
    /// Build from identifiers and geometries already in `crs`. Identifiers must be unique.
    pub fn new(ids: Vec<String>, geoms: Vec<MultiPolygon<f64>>, crs: Crs) -> Result<Self> {
        ensure!(
            ids.len() == geoms.len(),
            "reference ids ({}) do not match geometry count ({})",
            ids.len(), geoms.len()
        );
        let mut index = AHashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                bail!("duplicate reference id: {id:?}");
            }
        }
        Ok(Self { ids, geoms, index, crs })
    }

    /// Load the reference file, keep `(id, geometry)` and reproject into `target`.
    ///
    /// A `.shp` file takes its identifiers from the DBF field `id_field` and a GeoPackage from the
    /// column `id_field` of its first feature table. GeoJSON takes them from the property
    /// `id_field`, falling back to the feature id.
    pub fn load(path: &Path, id_field: &str, target: &Crs) -> Result<Self> {
        if !path.is_file() {
            return Err(DriftError::ReferenceNotFound { path: path.to_path_buf() }.into());
        }

        let (ids, shapes, crs) = match common::extension_lower(path).as_deref() {
            Some("shp") => {
                let contents = common::read_shapefile(path)?;
                let ids = contents.data.column(id_field)
                    .with_context(|| format!("reference file {} has no {id_field:?} field", path.display()))?
                    .str()?
                    .into_iter()
                    .map(|id| id.map(str::to_string))
                    .collect::<Vec<_>>();
                let (ids, shapes): (Vec<_>, Vec<_>) = ids.into_iter().zip(contents.shapes)
                    .enumerate()
                    .filter_map(|(i, (id, shape))| match shape {
                        Some(shape) => Some((id, shape)),
                        None => {
                            log::warn!("reference record {i} has no polygon geometry; skipping");
                            None
                        }
                    })
                    .unzip();
                (ids, shapes, contents.crs)
            }
            Some("geojson" | "json") => {
                let features = common::read_geojson_polygons(path, id_field)?;
                (features.ids, features.shapes, features.crs)
            }
            Some("gpkg") => {
                let features = common::read_gpkg_polygons(path, id_field)?;
                (features.ids, features.shapes, features.crs)
            }
            _ => return Err(DriftError::UnsupportedFormat { path: path.to_path_buf() }.into()),
        };

        let ids = ids.into_iter().enumerate()
            .map(|(i, id)| id.ok_or_else(|| anyhow!("reference feature {i} has no {id_field:?} value")))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("invalid reference file {}", path.display()))?;

        let geoms = crs.reproject(&shapes, target)
            .with_context(|| format!("failed to reproject {}", path.display()))?;

        log::info!("loaded {} reference areas from {} ({crs} -> {target})", ids.len(), path.display());
        Self::new(ids, geoms, target.clone())
            .with_context(|| format!("invalid reference file {}", path.display()))
    }

    #[inline] pub fn len(&self) -> usize { self.ids.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.ids.is_empty() }
    #[inline] pub fn id(&self, idx: usize) -> &str { &self.ids[idx] }
    #[inline] pub fn geom(&self, idx: usize) -> &MultiPolygon<f64> { &self.geoms[idx] }
    #[inline] pub fn geoms(&self) -> &[MultiPolygon<f64>] { &self.geoms }
    #[inline] pub fn crs(&self) -> &Crs { &self.crs }

    /// Position of a reference area by identifier.
    #[inline] pub fn index_of(&self, id: &str) -> Option<usize> { self.index.get(id).copied() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{common::write_geopackage, layer::parcel::tests::square};
    use std::fs;

    #[test]
    fn missing_file_is_reference_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ReferenceLayer::load(&tmp.path().join("prodes.geojson"), "uuid", &Crs::wgs84())
            .err().unwrap();
        assert!(matches!(err.downcast_ref::<DriftError>(), Some(DriftError::ReferenceNotFound { .. })));
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prodes.kml");
        fs::write(&path, b"<kml/>").unwrap();
        let err = ReferenceLayer::load(&path, "uuid", &Crs::wgs84()).err().unwrap();
        assert!(matches!(err.downcast_ref::<DriftError>(), Some(DriftError::UnsupportedFormat { .. })));
    }

    #[test]
    fn geopackage_reference_is_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prodes_amazonia_nb.gpkg");
        write_geopackage(&path, 4674, &[
            (Some("b"), Some((-52.0, -3.1, 0.1))),
            (Some("a"), Some((-60.0, -10.0, 0.1))),
        ]);

        let layer = ReferenceLayer::load(&path, "uuid", &Crs::from_epsg(4674)).unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.index_of("a"), Some(1));
        assert_eq!(layer.geom(0), &square(-52.0, -3.1, 0.1));
    }

    #[test]
    fn geopackage_rows_without_id_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prodes.gpkg");
        write_geopackage(&path, 4674, &[(None, Some((0.0, 0.0, 1.0)))]);
        assert!(ReferenceLayer::load(&path, "uuid", &Crs::from_epsg(4674)).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = ReferenceLayer::new(
            vec!["a".into(), "a".into()],
            vec![square(0.0, 0.0, 1.0), square(1.0, 0.0, 1.0)],
            Crs::wgs84(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn geojson_reference_is_indexed_by_id() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prodes.geojson");
        fs::write(&path, r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"uuid":"b"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type":"Feature","properties":{"uuid":"a"},"geometry":{"type":"Polygon","coordinates":[[[5,5],[6,5],[6,6],[5,6],[5,5]]]}}
        ]}"#).unwrap();

        let layer = ReferenceLayer::load(&path, "uuid", &Crs::wgs84()).unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.index_of("a"), Some(1));
        assert_eq!(layer.id(0), "b");
        assert_eq!(layer.crs(), &Crs::wgs84());
    }

    #[test]
    fn missing_ids_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prodes.geojson");
        fs::write(&path, r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}
        ]}"#).unwrap();
        assert!(ReferenceLayer::load(&path, "uuid", &Crs::wgs84()).is_err());
    }
}
