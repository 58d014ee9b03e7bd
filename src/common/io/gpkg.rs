use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::{Geometry, MultiPolygon};
use geozero::{wkb::GpkgWkb, ToGeo};
use rusqlite::{types::ValueRef, Connection, OpenFlags, OptionalExtension};

use crate::{common::PolygonFeatures, geom::Crs};

/// Double-quote an SQL identifier taken from the file itself.
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn value_to_id(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Text(text) => Some(String::from_utf8_lossy(text).trim().to_string()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(r) => Some(r.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

/// CRS of a `gpkg_spatial_ref_sys` entry: the EPSG code when the organization is EPSG, else the WKT.
fn crs_for_srs(conn: &Connection, srs_id: i64) -> Result<Crs> {
    let row = conn
        .query_row(
            "SELECT organization, organization_coordsys_id, definition FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            [srs_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?)),
        )
        .optional()
        .context("Failed to read gpkg_spatial_ref_sys")?;

    Ok(match row {
        Some((org, code, _)) if org.eq_ignore_ascii_case("EPSG") && code > 0 => Crs::from_epsg(code as u32),
        Some((_, _, definition)) => Crs::from_wkt(&definition),
        None => Crs::unknown(),
    })
}

/// Read polygon features from the first feature table of a GeoPackage.
/// Identifiers come from the `id_field` column; non-polygon and null geometries are skipped.
pub(crate) fn read_gpkg_polygons(path: &Path, id_field: &str) -> Result<PolygonFeatures> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open GeoPackage: {}", path.display()))?;

    let tables = conn
        .prepare(
            "SELECT g.table_name, g.column_name, g.srs_id FROM gpkg_geometry_columns g \
             JOIN gpkg_contents c ON c.table_name = g.table_name \
             WHERE c.data_type = 'features' ORDER BY g.table_name",
        )
        .and_then(|mut stmt| {
            let tables = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)))?
                .collect::<rusqlite::Result<Vec<_>>>();
            tables
        })
        .with_context(|| format!("Not a GeoPackage feature store: {}", path.display()))?;

    let Some((table, geom_column, srs_id)) = tables.first().cloned() else {
        bail!("GeoPackage {} has no feature table", path.display());
    };
    if tables.len() > 1 {
        log::warn!("{} feature tables in {}; using {table:?}", tables.len(), path.display());
    }
    let crs = crs_for_srs(&conn, srs_id)?;

    let sql = format!("SELECT {}, {} FROM {}", quote(id_field), quote(&geom_column), quote(&table));
    let mut stmt = conn.prepare(&sql)
        .with_context(|| format!("GeoPackage table {table:?} in {} has no {id_field:?} column", path.display()))?;
    let mut rows = stmt.query([])?;

    let mut ids = Vec::new();
    let mut shapes = Vec::new();
    let mut idx = 0usize;
    while let Some(row) = rows.next()? {
        let id = value_to_id(row.get_ref(0)?);
        let shape = match row.get_ref(1)? {
            ValueRef::Blob(blob) => GpkgWkb(blob.to_vec()).to_geo()
                .with_context(|| format!("invalid geometry in row {idx} of {table:?}"))?,
            _ => {
                log::warn!("row {idx} of {table:?} has no geometry; skipping");
                idx += 1;
                continue;
            }
        };
        let shape = match shape {
            Geometry::Polygon(polygon) => MultiPolygon(vec![polygon]),
            Geometry::MultiPolygon(mp) => mp,
            _ => {
                log::warn!("row {idx} of {table:?} is not a polygon; skipping");
                idx += 1;
                continue;
            }
        };
        ids.push(id);
        shapes.push(shape);
        idx += 1;
    }

    log::debug!("read {} polygons from {table:?} in {} ({crs})", shapes.len(), path.display());
    Ok(PolygonFeatures { ids, shapes, crs })
}

/// GeoPackage binary geometry: little-endian header without envelope, then a WKB polygon.
#[cfg(test)]
fn polygon_blob(srs_id: i32, ring: &[(f64, f64)]) -> Vec<u8> {
    let mut blob = vec![b'G', b'P', 0, 0x01];
    blob.extend(srs_id.to_le_bytes());
    blob.push(1);
    blob.extend(3u32.to_le_bytes());
    blob.extend(1u32.to_le_bytes());
    blob.extend((ring.len() as u32).to_le_bytes());
    for (x, y) in ring {
        blob.extend(x.to_le_bytes());
        blob.extend(y.to_le_bytes());
    }
    blob
}

/// Write a minimal GeoPackage with one `prodes` feature table in EPSG `srs_id`.
/// Features are (uuid, square as (x0, y0, size)); a `None` square stores a null geometry.
#[cfg(test)]
pub(crate) fn write_geopackage(path: &Path, srs_id: i32, features: &[(Option<&str>, Option<(f64, f64, f64)>)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE gpkg_spatial_ref_sys (srs_name TEXT NOT NULL, srs_id INTEGER PRIMARY KEY, \
            organization TEXT NOT NULL, organization_coordsys_id INTEGER NOT NULL, definition TEXT NOT NULL);
         CREATE TABLE gpkg_contents (table_name TEXT PRIMARY KEY, data_type TEXT NOT NULL, srs_id INTEGER);
         CREATE TABLE gpkg_geometry_columns (table_name TEXT NOT NULL, column_name TEXT NOT NULL, \
            geometry_type_name TEXT NOT NULL, srs_id INTEGER NOT NULL, z TINYINT NOT NULL, m TINYINT NOT NULL);
         CREATE TABLE prodes (fid INTEGER PRIMARY KEY AUTOINCREMENT, uuid TEXT, geom BLOB);",
    ).unwrap();
    conn.execute(
        "INSERT INTO gpkg_spatial_ref_sys VALUES ('EPSG', ?1, 'EPSG', ?1, 'undefined')",
        [srs_id],
    ).unwrap();
    conn.execute("INSERT INTO gpkg_contents VALUES ('prodes', 'features', ?1)", [srs_id]).unwrap();
    conn.execute("INSERT INTO gpkg_geometry_columns VALUES ('prodes', 'geom', 'POLYGON', ?1, 0, 0)", [srs_id]).unwrap();

    for (uuid, square) in features {
        let blob = square.map(|(x0, y0, size)| polygon_blob(srs_id, &[
            (x0, y0), (x0 + size, y0), (x0 + size, y0 + size), (x0, y0 + size), (x0, y0),
        ]));
        conn.execute("INSERT INTO prodes (uuid, geom) VALUES (?1, ?2)", rusqlite::params![uuid, blob]).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_polygons_ids_and_epsg() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prodes.gpkg");
        write_geopackage(&path, 4674, &[
            (Some("r-1"), Some((-52.0, -3.1, 0.1))),
            (None, Some((-60.0, -10.0, 0.1))),
            (Some("r-3"), None),
        ]);

        let features = read_gpkg_polygons(&path, "uuid").unwrap();
        assert_eq!(features.ids, vec![Some("r-1".to_string()), None]);
        assert_eq!(features.shapes.len(), 2);
        assert_eq!(features.crs.epsg(), Some(4674));

        let exterior = features.shapes[0].0[0].exterior();
        assert_eq!(exterior.0.len(), 5);
        assert_eq!(exterior.0[0].x, -52.0);
        assert_eq!(exterior.0[0].y, -3.1);
    }

    #[test]
    fn missing_id_column_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("prodes.gpkg");
        write_geopackage(&path, 4326, &[(Some("r-1"), Some((0.0, 0.0, 1.0)))]);
        assert!(read_gpkg_polygons(&path, "gid").is_err());
    }

    #[test]
    fn plain_sqlite_file_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("other.gpkg");
        Connection::open(&path).unwrap().execute_batch("CREATE TABLE t (x INTEGER);").unwrap();
        assert!(read_gpkg_polygons(&path, "uuid").is_err());
    }
}
