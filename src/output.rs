use std::{fs, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::{analysis::ChangeRecord, common, geom::Crs, DriftError, SurveyYears};

pub const REFERENCE_FILE: &str = "geometry_prodes.geojson";
pub const LINES_FILE: &str = "distance_lines.geojson";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Output file holding one survey year's parcel shapes.
pub fn year_file(year: u32) -> String { format!("geometry_{year}.geojson") }

/// Attributes shared by all four output layers.
fn properties(record: &ChangeRecord, later: u32) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("cod_imovel".into(), record.parcel_id.clone().into());
    properties.insert(format!("ind_status_{later}"), record.status_code.clone().into());
    properties.insert(format!("cod_estado_{later}"), record.state_code.clone().into());
    properties.insert("geodesic_distance".into(), record.geodesic_distance_m.into());
    properties
}

/// Write the four layers into `dir`, which must exist.
fn write_layers(dir: &Path, records: &[ChangeRecord], years: &SurveyYears, crs: &Crs) -> Result<()> {
    let layers: [(String, fn(&ChangeRecord) -> Value); 4] = [
        (year_file(years.earlier), |r| common::multipolygon_to_geojson(&r.earlier_geometry)),
        (year_file(years.later), |r| common::multipolygon_to_geojson(&r.later_geometry)),
        (REFERENCE_FILE.to_string(), |r| common::multipolygon_to_geojson(&r.reference_geometry)),
        (LINES_FILE.to_string(), |r| common::linestring_to_geojson(&r.displacement_line)),
    ];

    for (name, geometry) in layers {
        let collection = common::feature_collection(
            records.iter().map(|record| (geometry(record), properties(record, years.later))),
            crs,
        );
        let path = dir.join(&name);
        common::write_geojson_file(&path, &collection)?;
        log::debug!("wrote {} features to {}", records.len(), path.display());
    }
    Ok(())
}

/// Write the run outputs to `{outputs_root}/{dir_name}`.
///
/// Files are staged in a hidden temporary directory next to the target and moved into place in
/// one rename, so a failed run leaves no partial output directory. An existing target is never
/// overwritten.
pub fn write_outputs_named(records: &[ChangeRecord], years: &SurveyYears, crs: &Crs, outputs_root: &Path, dir_name: &str) -> Result<PathBuf> {
    common::ensure_dir_exists(outputs_root)?;
    let target = outputs_root.join(dir_name);
    if target.exists() {
        return Err(DriftError::OutputExists { path: target }.into());
    }

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(outputs_root)
        .with_context(|| format!("Failed to create staging directory in {}", outputs_root.display()))?;
    write_layers(staging.path(), records, years, crs)?;

    if target.exists() {
        return Err(DriftError::OutputExists { path: target }.into());
    }
    fs::rename(staging.path(), &target)
        .with_context(|| format!("Failed to move outputs into {}", target.display()))?;

    if records.is_empty() {
        log::warn!("no parcels qualified; wrote empty layers to {}", target.display());
    } else {
        log::info!("wrote {} parcels to {}", records.len(), target.display());
    }
    Ok(target)
}

/// Write the run outputs to `{outputs_root}/{YYYYMMDD_HHMMSS}` using the local time.
pub fn write_outputs(records: &[ChangeRecord], years: &SurveyYears, crs: &Crs, outputs_root: &Path) -> Result<PathBuf> {
    let stamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
    write_outputs_named(records, years, crs, outputs_root, &stamp)
}
