mod change;
mod displacement;
mod join;

use anyhow::{Context, Result};
use geo::{LineString, MultiPolygon, Point};

use crate::layer::{ParcelLayer, ReferenceLayer};

pub use change::{detect_changes, FlaggedParcel};
pub use displacement::{displacement, ensure_geographic, geodesic_distance, planar_centroid, Displacement};
pub use join::{intersect_reference, propagate_to_later, spatial_join, JoinedParcel};

/// A parcel that intersected a reference area in the earlier year and was reshaped so that it
/// no longer does in the later year.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub parcel_id: String,
    /// Status code in the later year.
    pub status_code: Option<String>,
    /// State code in the later year.
    pub state_code: Option<String>,
    pub earlier_geometry: MultiPolygon<f64>,
    pub later_geometry: MultiPolygon<f64>,
    pub reference_id: String,
    pub reference_geometry: MultiPolygon<f64>,
    pub geometry_changed: bool,
    pub earlier_centroid: Point<f64>,
    pub later_centroid: Point<f64>,
    pub geodesic_distance_m: f64,
    pub displacement_line: LineString<f64>,
}

/// Result of [`analyze`], with the intermediate counts kept for reporting.
#[derive(Debug, Clone)]
pub struct ChangeAnalysis {
    /// Parcels present in both years and paired with a reference area.
    pub joined: usize,
    /// Joined parcels whose geometry changed.
    pub changed: usize,
    pub records: Vec<ChangeRecord>,
}

/// Join, flag and measure: the whole pipeline between loading and writing.
///
/// All three layers must already share a CRS, and it must be geographic for the distance step.
pub fn analyze(earlier: &ParcelLayer, later: &ParcelLayer, reference: &ReferenceLayer) -> Result<ChangeAnalysis> {
    let joined = spatial_join(earlier, later, reference)?;
    let flagged = detect_changes(&joined, earlier, later, reference);
    let changed = flagged.iter().filter(|f| f.geometry_changed).count();
    let retained = flagged.into_iter().filter(FlaggedParcel::is_retained).collect::<Vec<_>>();
    log::info!("{changed} of {} joined parcels changed shape, {} no longer touch their reference area", joined.len(), retained.len());

    let later_records = later.records()?;
    let displacements = retained.iter()
        .map(|f| displacement(earlier.geom(f.joined.earlier_idx), later.geom(f.joined.later_idx)))
        .collect::<Result<Vec<_>>>()
        .context("failed to compute parcel centroids")?;
    ensure_geographic(
        later.crs(),
        displacements.iter().flat_map(|d| [&d.earlier_centroid, &d.later_centroid]),
    )?;

    let records = retained.into_iter().zip(displacements)
        .map(|(flagged, d)| {
            let JoinedParcel { earlier_idx, later_idx, reference_idx } = flagged.joined;
            let later_record = &later_records[later_idx];
            ChangeRecord {
                // Joined rows always carry a parcel id.
                parcel_id: later_record.parcel_id.unwrap_or_default().to_string(),
                status_code: later_record.status_code.map(str::to_string),
                state_code: later_record.state_code.map(str::to_string),
                earlier_geometry: earlier.geom(earlier_idx).clone(),
                later_geometry: later.geom(later_idx).clone(),
                reference_id: reference.id(reference_idx).to_string(),
                reference_geometry: reference.geom(reference_idx).clone(),
                geometry_changed: flagged.geometry_changed,
                earlier_centroid: d.earlier_centroid,
                later_centroid: d.later_centroid,
                geodesic_distance_m: d.geodesic_distance_m,
                displacement_line: d.line,
            }
        })
        .collect();

    Ok(ChangeAnalysis { joined: joined.len(), changed, records })
}
