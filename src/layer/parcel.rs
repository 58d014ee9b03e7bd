use std::{collections::BTreeMap, path::Path};

use ahash::AHashSet;
use anyhow::{ensure, Context, Result};
use geo::{MultiPolygon, Validation};
use polars::prelude::{BooleanChunked, DataFrame, NewChunkedArray};

use crate::{common, geom::Crs, layer::schema};

/// A parcel layer as read from disk: any columns, possibly missing or non-polygon shapes.
pub struct RawLayer {
    data: DataFrame,
    shapes: Vec<Option<MultiPolygon<f64>>>,
    crs: Crs,
}

/// One row of a [`ParcelLayer`], borrowed.
#[derive(Debug, Clone, Copy)]
pub struct ParcelRecord<'a> {
    pub parcel_id: Option<&'a str>,
    pub status_code: Option<&'a str>,
    pub record_type: Option<&'a str>,
    pub state_code: Option<&'a str>,
    pub geometry: &'a MultiPolygon<f64>,
}

/// A cleaned parcel layer for one survey year: canonical columns, only retained record types and
/// statuses, no exact duplicate rows and only valid geometries.
pub struct ParcelLayer {
    year: u32,
    data: DataFrame,
    geoms: Vec<MultiPolygon<f64>>,
    crs: Crs,
}

/// Keep the entries of `items` whose mask flag is set.
fn retain_by_mask<T>(items: Vec<T>, mask: &[bool]) -> Vec<T> {
    items.into_iter().zip(mask).filter_map(|(item, &keep)| keep.then_some(item)).collect()
}

/// Hashable, exact encoding of a geometry: part and ring sizes plus coordinate bits.
fn geometry_key(shape: &MultiPolygon<f64>) -> Vec<u64> {
    let mut key = vec![shape.0.len() as u64];
    for polygon in &shape.0 {
        key.push(polygon.interiors().len() as u64 + 1);
        for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
            key.push(ring.0.len() as u64);
            key.extend(ring.0.iter().flat_map(|c| [c.x.to_bits(), c.y.to_bits()]));
        }
    }
    key
}

impl RawLayer {
    pub fn new(data: DataFrame, shapes: Vec<Option<MultiPolygon<f64>>>, crs: Crs) -> Result<Self> {
        ensure!(
            data.height() == shapes.len(),
            "attribute rows ({}) do not match shape count ({})",
            data.height(), shapes.len()
        );
        Ok(Self { data, shapes, crs })
    }

    /// Read a layer from a `.shp` file (with its `.shx`, `.dbf` and optional `.prj`).
    pub fn read(path: &Path) -> Result<Self> {
        let contents = common::read_shapefile(path)?;
        Self::new(contents.data, contents.shapes, contents.crs)
    }

    #[inline] pub fn len(&self) -> usize { self.shapes.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.shapes.is_empty() }
    #[inline] pub fn data(&self) -> &DataFrame { &self.data }
    #[inline] pub fn crs(&self) -> &Crs { &self.crs }

    /// Rename source-specific columns to the canonical names.
    pub fn standardize(mut self) -> Result<Self> {
        schema::standardize_columns(&mut self.data)?;
        Ok(self)
    }

    /// Reduce the attribute table to the canonical columns.
    pub fn project(mut self) -> Result<Self> {
        self.data = schema::project_canonical(&self.data)?;
        Ok(self)
    }

    /// Concatenate projected layers, preserving every record in order.
    /// The CRS of the first layer is used for the whole result.
    pub fn concat(layers: Vec<RawLayer>) -> Result<Self> {
        let mut layers = layers.into_iter();
        let Some(mut merged) = layers.next() else {
            return Self::new(schema::project_canonical(&DataFrame::empty())?, Vec::new(), Crs::unknown());
        };
        for layer in layers {
            if !layer.crs.is_equivalent(&merged.crs) {
                log::warn!("concatenating layers with different CRS ({} vs {}); keeping {}", layer.crs, merged.crs, merged.crs);
            }
            merged.data.vstack_mut(&layer.data)
                .context("failed to concatenate attribute tables")?;
            merged.shapes.extend(layer.shapes);
        }
        Ok(merged)
    }

    fn filter_rows(self, mask: &[bool]) -> Result<Self> {
        let data = self.data.filter(&BooleanChunked::from_slice("mask".into(), mask))?;
        Ok(Self { data, shapes: retain_by_mask(self.shapes, mask), crs: self.crs })
    }

    /// Apply the canonical cleanup in order: record-type/status filter, exact-duplicate removal,
    /// then invalid-geometry removal. Expects a projected layer.
    pub fn into_parcels(self, year: u32) -> Result<ParcelLayer> {
        let total = self.len();

        let mask = {
            let types = self.data.column(schema::RECORD_TYPE)?.str()?;
            let statuses = self.data.column(schema::STATUS_CODE)?.str()?;
            types.into_iter().zip(statuses.into_iter())
                .map(|(record_type, status)| schema::is_retained(record_type, status))
                .collect::<Vec<_>>()
        };
        let layer = self.filter_rows(&mask)?;
        let filtered = layer.len();

        let mask = {
            let columns = schema::CANONICAL_COLUMNS.iter()
                .map(|name| Ok(layer.data.column(name)?.str()?))
                .collect::<Result<Vec<_>>>()?;
            let mut seen = AHashSet::with_capacity(layer.len());
            layer.shapes.iter().enumerate()
                .map(|(i, shape)| {
                    let attrs = columns.iter().map(|col| col.get(i)).collect::<Vec<_>>();
                    seen.insert((attrs, shape.as_ref().map(geometry_key)))
                })
                .collect::<Vec<_>>()
        };
        let layer = layer.filter_rows(&mask)?;
        let deduplicated = layer.len();

        let mask = layer.shapes.iter()
            .map(|shape| shape.as_ref().is_some_and(|shape| shape.is_valid()))
            .collect::<Vec<_>>();
        let layer = layer.filter_rows(&mask)?;

        log::info!(
            "[{year}] {total} records read, {filtered} boundary records with retained status, \
             {deduplicated} after removing duplicates, {} with valid geometry",
            layer.len(),
        );

        Ok(ParcelLayer {
            year,
            data: layer.data,
            geoms: layer.shapes.into_iter().flatten().collect(),
            crs: layer.crs,
        })
    }
}

impl ParcelLayer {
    /// Build a cleaned layer directly; `data` must hold the canonical columns.
    pub fn from_parts(year: u32, data: DataFrame, geoms: Vec<MultiPolygon<f64>>, crs: Crs) -> Result<Self> {
        ensure!(
            data.height() == geoms.len(),
            "attribute rows ({}) do not match geometry count ({})",
            data.height(), geoms.len()
        );
        let data = schema::project_canonical(&data)?;
        Ok(Self { year, data, geoms, crs })
    }

    #[inline] pub fn year(&self) -> u32 { self.year }
    #[inline] pub fn len(&self) -> usize { self.geoms.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.geoms.is_empty() }
    #[inline] pub fn data(&self) -> &DataFrame { &self.data }
    #[inline] pub fn geoms(&self) -> &[MultiPolygon<f64>] { &self.geoms }
    #[inline] pub fn geom(&self, idx: usize) -> &MultiPolygon<f64> { &self.geoms[idx] }
    #[inline] pub fn crs(&self) -> &Crs { &self.crs }

    /// Borrowed view of every row, in layer order.
    pub fn records(&self) -> Result<Vec<ParcelRecord<'_>>> {
        let parcel_ids = self.data.column(schema::PARCEL_ID)?.str()?;
        let statuses = self.data.column(schema::STATUS_CODE)?.str()?;
        let types = self.data.column(schema::RECORD_TYPE)?.str()?;
        let states = self.data.column(schema::STATE_CODE)?.str()?;

        Ok(self.geoms.iter().enumerate()
            .map(|(i, geometry)| ParcelRecord {
                parcel_id: parcel_ids.get(i),
                status_code: statuses.get(i),
                record_type: types.get(i),
                state_code: states.get(i),
                geometry,
            })
            .collect())
    }

    /// Number of records per state code (null state codes are counted under "").
    pub fn count_by_state(&self) -> Result<BTreeMap<String, usize>> {
        let mut counts = BTreeMap::new();
        for state in self.data.column(schema::STATE_CODE)?.str()?.into_iter() {
            *counts.entry(state.unwrap_or_default().to_string()).or_default() += 1;
        }
        Ok(counts)
    }
}
