use std::{collections::BTreeMap, fmt, path::PathBuf};

use anyhow::{Context, Result};

use crate::{analysis, layer::{self, ParcelLayer, ReferenceLayer}, output, RunConfig};

/// What a run did, for reporting.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Cleaned record count per loaded year.
    pub loaded: BTreeMap<u32, usize>,
    pub reference_areas: usize,
    pub joined: usize,
    pub changed: usize,
    pub retained: usize,
    pub output_dir: PathBuf,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loaded = self.loaded.iter()
            .map(|(year, count)| format!("{year}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "parcels loaded ({loaded}), {} reference areas, {} joined, {} changed, {} retained -> {}",
            self.reference_areas, self.joined, self.changed, self.retained, self.output_dir.display(),
        )
    }
}

/// Log record counts per state for the latest snapshot.
fn log_state_counts(layer: &ParcelLayer) -> Result<()> {
    for (state, count) in layer.count_by_state()? {
        let state = if state.is_empty() { "(none)" } else { state.as_str() };
        log::info!("[{}] {state}: {count} parcels", layer.year());
    }
    Ok(())
}

/// Run the whole analysis for one configuration: load every distinct year once, load the
/// reference layer in the later year's CRS, join, flag, measure and write the four outputs.
pub fn run(config: &RunConfig) -> Result<RunSummary> {
    let years = config.years;
    log::info!("comparing {} with {} (latest snapshot {})", years.earlier, years.later, years.latest);

    let mut layers = BTreeMap::new();
    for year in years.distinct() {
        let layer = layer::load_year(config, year)
            .with_context(|| format!("failed to load parcels for {year}"))?;
        if years.is_latest(year) {
            log_state_counts(&layer)?;
        }
        layers.insert(year, layer);
    }
    let loaded = layers.iter().map(|(&year, layer)| (year, layer.len())).collect();

    let earlier = &layers[&years.earlier];
    let later = &layers[&years.later];
    if !earlier.crs().is_equivalent(later.crs()) {
        log::warn!("{} and {} layers have different CRS ({} vs {}); comparing coordinates as is",
            years.earlier, years.later, earlier.crs(), later.crs());
    }

    let reference = ReferenceLayer::load(&config.reference_path, &config.reference_id_field, later.crs())?;
    let analysis = analysis::analyze(earlier, later, &reference)?;
    let output_dir = output::write_outputs(&analysis.records, &years, later.crs(), &config.outputs_root)?;

    Ok(RunSummary {
        loaded,
        reference_areas: reference.len(),
        joined: analysis.joined,
        changed: analysis.changed,
        retained: analysis.records.len(),
        output_dir,
    })
}
