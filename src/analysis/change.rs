use geo::Intersects;

use crate::{analysis::JoinedParcel, layer::{ParcelLayer, ReferenceLayer}};

/// Change-detection outcome for one joined parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlaggedParcel {
    pub joined: JoinedParcel,
    /// Earlier and later geometries differ coordinate for coordinate.
    pub geometry_changed: bool,
    /// Later geometry still intersects the paired reference area.
    pub still_intersects: bool,
}

impl FlaggedParcel {
    /// Reshaped so that it no longer overlaps its reference area.
    #[inline] pub fn is_retained(&self) -> bool { self.geometry_changed && !self.still_intersects }
}

/// Flag every joined parcel. The intersects test only runs for changed geometries, since an
/// unchanged parcel is discarded either way.
pub fn detect_changes(joined: &[JoinedParcel], earlier: &ParcelLayer, later: &ParcelLayer, reference: &ReferenceLayer) -> Vec<FlaggedParcel> {
    joined.iter()
        .map(|&joined| {
            let later_geom = later.geom(joined.later_idx);
            let geometry_changed = earlier.geom(joined.earlier_idx) != later_geom;
            let still_intersects = !geometry_changed || later_geom.intersects(reference.geom(joined.reference_idx));
            FlaggedParcel { joined, geometry_changed, still_intersects }
        })
        .collect()
}
