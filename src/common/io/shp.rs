use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use polars::prelude::{Column, DataFrame, NamedFrom};
use shapefile::{dbase::{FieldValue, Record}, PolygonRing, Reader, Shape};

use crate::{common, geom::Crs};

/// Attribute table, shapes and CRS of one shapefile family.
pub(crate) struct ShapefileContents {
    pub data: DataFrame,
    /// `None` for null or non-polygon shapes.
    pub shapes: Vec<Option<MultiPolygon<f64>>>,
    pub crs: Crs,
}

/// Group rings into polygons: each outer ring owns the inner rings that follow it
/// (Shapefile stores rings in this order).
fn rings_to_multipolygon<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> Coord<f64>) -> MultiPolygon<f64> {
    /// Ensure first and last are the same for geo::LineString coords
    fn closed(mut coords: Vec<Coord<f64>>) -> LineString<f64> {
        if !coords.is_empty() && coords[0] != coords[coords.len() - 1] {
            coords.push(coords[0]);
        }
        LineString(coords)
    }

    let mut polys: Vec<Polygon<f64>> = Vec::new();
    let mut current_exterior: Option<LineString<f64>> = None;
    let mut current_holes: Vec<LineString<f64>> = Vec::new();

    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => {
                if let Some(ext) = current_exterior.take() {
                    polys.push(Polygon::new(ext, std::mem::take(&mut current_holes)));
                }
                current_exterior = Some(closed(points.iter().map(&xy).collect()));
            }
            PolygonRing::Inner(points) => current_holes.push(closed(points.iter().map(&xy).collect())),
        }
    }
    if let Some(ext) = current_exterior {
        polys.push(Polygon::new(ext, current_holes));
    }

    MultiPolygon(polys)
}

/// Convert a shapefile shape to a MultiPolygon, dropping any M/Z ordinates.
pub(crate) fn shape_to_multipolygon(shape: &Shape) -> Option<MultiPolygon<f64>> {
    let mp = match shape {
        Shape::Polygon(p) => rings_to_multipolygon(p.rings(), |pt| Coord { x: pt.x, y: pt.y }),
        Shape::PolygonM(p) => rings_to_multipolygon(p.rings(), |pt| Coord { x: pt.x, y: pt.y }),
        Shape::PolygonZ(p) => rings_to_multipolygon(p.rings(), |pt| Coord { x: pt.x, y: pt.y }),
        _ => return None,
    };
    (!mp.0.is_empty()).then_some(mp)
}

/// Render a DBF value as text. Dates and binary payloads are not carried.
fn field_to_string(value: FieldValue) -> Option<String> {
    match value {
        FieldValue::Character(s) => s.map(|s| s.trim().to_string()),
        FieldValue::Memo(s) => Some(s.trim().to_string()),
        FieldValue::Numeric(n) => n.map(format_number),
        FieldValue::Float(f) => f.map(|f| format_number(f as f64)),
        FieldValue::Double(d) => Some(format_number(d)),
        FieldValue::Currency(c) => Some(format_number(c)),
        FieldValue::Integer(i) => Some(i.to_string()),
        FieldValue::Logical(b) => b.map(|b| b.to_string()),
        _ => None,
    }
}

/// Integral values print without a trailing `.0` so codes stored as numbers stay comparable.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 { format!("{}", n as i64) } else { n.to_string() }
}

/// Convert records to a DataFrame with one nullable String column per DBF field, in name order.
fn records_to_dataframe(records: Vec<Record>) -> Result<DataFrame> {
    let height = records.len();
    let mut columns: BTreeMap<String, Vec<Option<String>>> = BTreeMap::new();

    for (row, record) in records.into_iter().enumerate() {
        for (field, value) in record {
            columns.entry(field)
                .or_insert_with(|| vec![None; height])[row] = field_to_string(value);
        }
    }

    Ok(DataFrame::new(
        columns.into_iter()
            .map(|(name, values)| Column::new(name.into(), values))
            .collect()
    )?)
}

/// Read the CRS from the `.prj` sidecar, if there is one.
pub(crate) fn crs_from_prj(shp_path: &Path) -> Result<Crs> {
    match common::sibling_with_extension(shp_path, "prj") {
        Some(prj) => {
            let wkt = fs::read_to_string(&prj)
                .with_context(|| format!("Failed to read projection file: {}", prj.display()))?;
            Ok(Crs::from_wkt(&wkt))
        }
        None => Ok(Crs::unknown()),
    }
}

/// Reads all shapes + attribute records from a given `.shp` file path.
pub(crate) fn read_shapefile(path: &Path) -> Result<ShapefileContents> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {}", path.display()))?;

    let size = reader.shape_count()?;
    let mut shapes = Vec::with_capacity(size);
    let mut records = Vec::with_capacity(size);
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result
            .with_context(|| format!("Error reading shape+record in {}", path.display()))?;
        shapes.push(shape_to_multipolygon(&shape));
        records.push(record);
    }

    let data = records_to_dataframe(records)
        .with_context(|| format!("Error building attribute table for {}", path.display()))?;
    let crs = crs_from_prj(path)?;

    log::debug!("read {} shapes from {} ({crs})", shapes.len(), path.display());
    Ok(ShapefileContents { data, shapes, crs })
}
