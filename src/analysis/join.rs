use ahash::{AHashMap, AHashSet};
use anyhow::Result;
use geo::Intersects;

use crate::{geom, layer::{ParcelLayer, ReferenceLayer}};

/// One surviving parcel: its earlier-year row, the later-year row sharing its parcel id, and the
/// single reference area paired with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinedParcel {
    pub earlier_idx: usize,
    pub later_idx: usize,
    pub reference_idx: usize,
}

/// Pair earlier-year parcels with the reference areas they intersect (touching counts).
///
/// Parcels with no intersecting area are dropped. A parcel that intersects several areas keeps
/// the one with the lexicographically smallest reference id. Rows are visited in layer order and
/// only the first row of each parcel id that intersects anything is kept; rows without a parcel
/// id cannot be joined across years and are skipped.
///
/// Returns `(earlier_idx, reference_idx)` pairs in earlier-year order.
pub fn intersect_reference(earlier: &ParcelLayer, reference: &ReferenceLayer) -> Result<Vec<(usize, usize)>> {
    let tree = geom::bulk_load(reference.geoms());
    let records = earlier.records()?;

    let mut seen = AHashSet::with_capacity(records.len());
    let mut pairs = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let Some(parcel_id) = record.parcel_id else { continue };
        if seen.contains(parcel_id) { continue }
        let Some(envelope) = geom::envelope_of(record.geometry) else { continue };

        let best = tree.locate_in_envelope_intersecting(&envelope)
            .map(|bbox| bbox.idx())
            .filter(|&r| record.geometry.intersects(reference.geom(r)))
            .min_by(|&a, &b| reference.id(a).cmp(reference.id(b)));

        if let Some(r) = best {
            seen.insert(parcel_id);
            pairs.push((i, r));
        }
    }

    log::info!("{} of {} earlier parcels intersect a reference area", pairs.len(), earlier.len());
    Ok(pairs)
}

/// Carry `(earlier_idx, reference_idx)` pairs to the later year by parcel id.
/// Pairs without a later-year record are dropped; repeated later ids resolve to the first row.
pub fn propagate_to_later(earlier: &ParcelLayer, later: &ParcelLayer, pairs: &[(usize, usize)]) -> Result<Vec<JoinedParcel>> {
    let earlier_records = earlier.records()?;

    let mut first_later = AHashMap::with_capacity(later.len());
    for (i, record) in later.records()?.iter().enumerate() {
        if let Some(parcel_id) = record.parcel_id {
            first_later.entry(parcel_id).or_insert(i);
        }
    }

    Ok(pairs.iter()
        .filter_map(|&(earlier_idx, reference_idx)| {
            let parcel_id = earlier_records[earlier_idx].parcel_id?;
            let later_idx = *first_later.get(parcel_id)?;
            Some(JoinedParcel { earlier_idx, later_idx, reference_idx })
        })
        .collect())
}

/// Full spatial join: one later-year geometry and one reference pairing per surviving parcel id.
pub fn spatial_join(earlier: &ParcelLayer, later: &ParcelLayer, reference: &ReferenceLayer) -> Result<Vec<JoinedParcel>> {
    let pairs = intersect_reference(earlier, reference)?;
    let joined = propagate_to_later(earlier, later, &pairs)?;
    log::info!("{} parcels found in both {} and {}", joined.len(), earlier.year(), later.year());
    Ok(joined)
}
