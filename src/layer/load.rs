use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{common, layer::{ParcelLayer, RawLayer}, DriftError, RunConfig};

const FAMILY: &str = "shapefile (.shp/.shx/.dbf)";

/// Pick the shapefile family to load from `dir`: the first complete one in name order.
fn single_family(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(DriftError::MissingInput { dir: dir.to_path_buf(), what: FAMILY }.into());
    }
    let families = common::shapefile_families(dir)?;
    match families.as_slice() {
        [] => Err(DriftError::MissingInput { dir: dir.to_path_buf(), what: FAMILY }.into()),
        [only] => Ok(only.clone()),
        [first, ..] => {
            log::warn!("{} shapefiles in {}; using {}", families.len(), dir.display(), first.display());
            Ok(first.clone())
        }
    }
}

/// Read, standardize and project one shapefile family.
fn read_projected(path: &Path) -> Result<RawLayer> {
    RawLayer::read(path)?
        .standardize()?
        .project()
        .with_context(|| format!("failed to prepare {}", path.display()))
}

/// Load a year stored as a single shapefile family directly in `dir`.
pub fn load_flat(dir: &Path, year: u32) -> Result<ParcelLayer> {
    let path = single_family(dir)?;
    log::info!("[{year}] loading {}", path.display());
    read_projected(&path)?.into_parcels(year)
}

/// Load a year stored as one subdirectory per state, concatenating every state's records.
pub fn load_per_state(dir: &Path, year: u32) -> Result<ParcelLayer> {
    if !dir.is_dir() {
        return Err(DriftError::MissingInput { dir: dir.to_path_buf(), what: "state directory" }.into());
    }
    let states = common::subdirectories(dir)?;
    if states.is_empty() {
        return Err(DriftError::MissingInput { dir: dir.to_path_buf(), what: "state directory" }.into());
    }

    let layers = states.iter()
        .map(|state_dir| {
            let path = single_family(state_dir)?;
            let layer = read_projected(&path)?;
            log::debug!("[{year}] {} records from {}", layer.len(), path.display());
            Ok(layer)
        })
        .collect::<Result<Vec<_>>>()?;

    log::info!("[{year}] loaded {} state layers from {}", layers.len(), dir.display());
    RawLayer::concat(layers)?.into_parcels(year)
}

/// Load one year with the layout the run configuration assigns to it.
pub fn load_year(config: &RunConfig, year: u32) -> Result<ParcelLayer> {
    let dir = config.year_dir(year);
    if config.years.is_latest(year) {
        load_per_state(&dir, year)
    } else {
        load_flat(&dir, year)
    }
}

/// Shapefile families present in one folder.
#[derive(Debug, Clone)]
pub struct FolderInventory {
    pub dir: PathBuf,
    pub families: Vec<PathBuf>,
}

impl FolderInventory {
    #[inline] pub fn is_complete(&self) -> bool { !self.families.is_empty() }
}

/// List the shapefile families of a year directory without loading them: the directory itself
/// for the flat layout, or each state subdirectory for the per-state layout.
pub fn inventory(dir: &Path, per_state: bool) -> Result<Vec<FolderInventory>> {
    common::require_dir_exists(dir)?;
    let folders = if per_state { common::subdirectories(dir)? } else { vec![dir.to_path_buf()] };

    folders.into_iter()
        .map(|dir| Ok(FolderInventory { families: common::shapefile_families(&dir)?, dir }))
        .collect()
}
