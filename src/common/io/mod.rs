mod geojson;
mod gpkg;
mod shp;

use geo::MultiPolygon;

use crate::geom::Crs;

pub(crate) use self::geojson::*;
pub(crate) use self::gpkg::*;
pub(crate) use self::shp::*;

/// Polygon features with one identifier each, as read from a reference file.
pub(crate) struct PolygonFeatures {
    /// `None` where the feature carries no usable identifier.
    pub ids: Vec<Option<String>>,
    pub shapes: Vec<MultiPolygon<f64>>,
    pub crs: Crs,
}
