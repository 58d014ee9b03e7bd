use geo::{BoundingRect, MultiPolygon, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// A bounding box in an R-tree, associated with a MultiPolygon by index.
#[derive(Debug, Clone)]
pub(crate) struct BoundingBox {
    idx: usize, // Index of corresponding MultiPolygon in its layer
    bbox: Rect<f64>,
}

impl BoundingBox {
    pub(crate) fn new(idx: usize, bbox: Rect<f64>) -> Self {
        Self { idx, bbox }
    }

    /// Get the index of the corresponding MultiPolygon.
    #[inline] pub(crate) fn idx(&self) -> usize { self.idx }
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Bulk-load an R-tree over shape bounding boxes. Empty shapes have no box and are left out.
pub(crate) fn bulk_load(shapes: &[MultiPolygon<f64>]) -> RTree<BoundingBox> {
    RTree::bulk_load(
        shapes.iter().enumerate()
            .filter_map(|(i, shape)| shape.bounding_rect().map(|rect| BoundingBox::new(i, rect)))
            .collect()
    )
}

/// Envelope of a shape for R-tree queries.
pub(crate) fn envelope_of(shape: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    shape.bounding_rect()
        .map(|rect| AABB::from_corners(rect.min().into(), rect.max().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn touching_boxes_are_returned_by_envelope_query() {
        let a = MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]]);
        let b = MultiPolygon(vec![polygon![(x: 1.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 1.0), (x: 1.0, y: 1.0)]]);
        let c = MultiPolygon(vec![polygon![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 6.0, y: 6.0)]]);
        let tree = bulk_load(&[b, c, MultiPolygon(vec![])]);

        let mut hits = tree.locate_in_envelope_intersecting(&envelope_of(&a).unwrap())
            .map(BoundingBox::idx)
            .collect::<Vec<_>>();
        hits.sort();
        assert_eq!(hits, vec![0]);
        assert_eq!(tree.size(), 2);
    }
}
