use anyhow::{anyhow, Result};
use geo::{Centroid, Distance, Geodesic, LineString, MultiPolygon, Point};

use crate::{geom::{Crs, CrsKind}, DriftError};

/// Centroid shift of one parcel between two survey years.
#[derive(Debug, Clone, PartialEq)]
pub struct Displacement {
    pub earlier_centroid: Point<f64>,
    pub later_centroid: Point<f64>,
    /// Meters on the WGS 84 ellipsoid.
    pub geodesic_distance_m: f64,
    /// Two vertices, earlier centroid first.
    pub line: LineString<f64>,
}

/// Planar centroid in the layer's own coordinates.
pub fn planar_centroid(shape: &MultiPolygon<f64>) -> Result<Point<f64>> {
    shape.centroid().ok_or_else(|| anyhow!("cannot take the centroid of an empty geometry"))
}

/// Geodesic distance in meters between two (lon, lat) points. Zero exactly when the points are equal.
pub fn geodesic_distance(from: Point<f64>, to: Point<f64>) -> f64 {
    if from == to {
        return 0.0;
    }
    Geodesic.distance(from, to)
}

/// Measure how far a parcel's centroid moved. Coordinates must be lon/lat degrees.
pub fn displacement(earlier: &MultiPolygon<f64>, later: &MultiPolygon<f64>) -> Result<Displacement> {
    let earlier_centroid = planar_centroid(earlier)?;
    let later_centroid = planar_centroid(later)?;
    Ok(Displacement {
        earlier_centroid,
        later_centroid,
        geodesic_distance_m: geodesic_distance(earlier_centroid, later_centroid),
        line: LineString::from(vec![earlier_centroid, later_centroid]),
    })
}

#[inline]
fn in_lon_lat_bounds(p: &Point<f64>) -> bool {
    (-180.0..=180.0).contains(&p.x()) && (-90.0..=90.0).contains(&p.y())
}

/// Refuse to compute geodesic distances on projected coordinates.
///
/// A projected CRS always fails. An unknown CRS passes only when every point lies within
/// longitude/latitude bounds.
pub fn ensure_geographic<'a>(crs: &Crs, points: impl IntoIterator<Item = &'a Point<f64>>) -> Result<()> {
    let geographic = match crs.kind() {
        CrsKind::Geographic => true,
        CrsKind::Projected => false,
        CrsKind::Unknown => {
            let (mut checked, mut in_bounds) = (0usize, true);
            for point in points {
                checked += 1;
                if !in_lon_lat_bounds(point) {
                    in_bounds = false;
                    break;
                }
            }
            if in_bounds && checked > 0 {
                log::warn!("layer CRS is unknown; assuming lon/lat degrees since all {checked} centroids are in range");
            }
            in_bounds
        }
    };
    if geographic {
        Ok(())
    } else {
        Err(DriftError::NonGeographicCrs { crs: crs.to_string() }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::parcel::tests::square;

    #[test]
    fn one_degree_of_longitude_on_the_equator() {
        let d = displacement(&square(0.0, -0.5, 1.0), &square(1.0, -0.5, 1.0)).unwrap();
        assert!((d.earlier_centroid.x() - 0.5).abs() < 1e-12 && d.earlier_centroid.y().abs() < 1e-12);
        assert!((d.later_centroid.x() - 1.5).abs() < 1e-12 && d.later_centroid.y().abs() < 1e-12);
        // WGS 84 equatorial radius * pi / 180
        assert!((d.geodesic_distance_m - 111_319.49).abs() < 1.0, "{}", d.geodesic_distance_m);
        assert_eq!(d.line.0.len(), 2);
        assert_eq!(d.line.0[0], d.earlier_centroid.0);
        assert_eq!(d.line.0[1], d.later_centroid.0);
    }

    #[test]
    fn distance_is_zero_only_for_equal_centroids() {
        let a = Point::new(-52.3, -3.1);
        assert_eq!(geodesic_distance(a, a), 0.0);
        assert!(geodesic_distance(a, Point::new(-52.3, -3.100001)) > 0.0);
        assert!(geodesic_distance(Point::new(-60.0, -10.0), a) > 0.0);
    }

    #[test]
    fn identical_shapes_have_zero_distance() {
        let d = displacement(&square(-52.0, -3.0, 0.01), &square(-52.0, -3.0, 0.01)).unwrap();
        assert_eq!(d.geodesic_distance_m, 0.0);
        assert_eq!(d.line.0[0], d.line.0[1]);
    }

    #[test]
    fn projected_crs_is_rejected() {
        let points = [Point::new(500_000.0, 9_600_000.0)];
        let err = ensure_geographic(&Crs::from_epsg(31982), &points).unwrap_err();
        assert!(matches!(err.downcast_ref::<DriftError>(), Some(DriftError::NonGeographicCrs { .. })));
        assert!(ensure_geographic(&Crs::from_epsg(4674), &points).is_ok());
    }

    #[test]
    fn unknown_crs_is_checked_by_range() {
        assert!(ensure_geographic(&Crs::unknown(), &[Point::new(-52.0, -3.0)]).is_ok());
        assert!(ensure_geographic(&Crs::unknown(), &[Point::new(500_000.0, 9_600_000.0)]).is_err());
    }

    #[test]
    fn unknown_crs_without_points_passes() {
        assert!(ensure_geographic(&Crs::unknown(), &[] as &[Point<f64>]).is_ok());
        assert!(ensure_geographic(&Crs::from_epsg(31982), &[] as &[Point<f64>]).is_err());
    }
}
