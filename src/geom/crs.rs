use std::{fmt, sync::LazyLock};

use anyhow::{anyhow, Context, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::{proj::Proj as Proj4, transform::transform};
use regex::Regex;

/// Whether coordinates are angular (lon/lat degrees) or planar (projected units).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsKind {
    Geographic,
    Projected,
    Unknown,
}

/// A coordinate reference system, as far as we can tell from `.prj` WKT or a GeoJSON `crs` member.
#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    kind: CrsKind,
    epsg: Option<u32>,
    proj4: Option<String>,
}

const BRAZIL_ALBERS_PROJ4: &str =
    "+proj=aea +lat_0=-12 +lon_0=-54 +lat_1=-2 +lat_2=-22 +x_0=5000000 +y_0=10000000 +ellps=GRS80 +units=m +no_defs";

/// PROJ.4 definitions for the EPSG codes found in SICAR / PRODES deliveries.
fn known_epsg(code: u32) -> Option<(CrsKind, String)> {
    use CrsKind::*;
    let def = match code {
        4326 => (Geographic, "+proj=longlat +datum=WGS84 +no_defs".to_string()),
        4674 => (Geographic, "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string()),
        4618 => (Geographic, "+proj=longlat +ellps=aust_SA +towgs84=-67.35,3.88,-38.22,0,0,0,0 +no_defs".to_string()),
        4269 => (Geographic, "+proj=longlat +datum=NAD83 +no_defs".to_string()),
        5880 => (Projected, "+proj=poly +lat_0=0 +lon_0=-54 +x_0=5000000 +y_0=10000000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs".to_string()),
        // SIRGAS 2000 / UTM zones 11S..25S
        31971..=31985 => (Projected, format!("+proj=utm +zone={} +south +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs", code - 31960)),
        // WGS 84 / UTM north and south
        32601..=32660 => (Projected, format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs", code - 32600)),
        32701..=32760 => (Projected, format!("+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs", code - 32700)),
        _ => return None,
    };
    Some(def)
}

static EPSG_AUTHORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:AUTHORITY|ID)\[\s*"EPSG"\s*,\s*"?(\d+)"?"#).expect("valid regex")
});

static UTM_ZONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"UTM ZONE (\d{1,2})([NS])").expect("valid regex")
});

impl Crs {
    pub fn unknown() -> Self {
        Self { kind: CrsKind::Unknown, epsg: None, proj4: None }
    }

    /// WGS 84 lon/lat, the GeoJSON default.
    pub fn wgs84() -> Self { Self::from_epsg(4326) }

    /// Build from an EPSG code. Codes outside the known table keep the code but have unknown kind.
    pub fn from_epsg(code: u32) -> Self {
        match known_epsg(code) {
            Some((kind, proj4)) => Self { kind, epsg: Some(code), proj4: Some(proj4) },
            None => Self { kind: CrsKind::Unknown, epsg: Some(code), proj4: None },
        }
    }

    /// Interpret the WKT found in a shapefile `.prj` sidecar (ESRI WKT1, OGC WKT1 or WKT2).
    pub fn from_wkt(wkt: &str) -> Self {
        let text = wkt.trim().to_ascii_uppercase();
        let kind = if text.starts_with("PROJCS") || text.starts_with("PROJCRS") {
            CrsKind::Projected
        } else if ["GEOGCS", "GEOGCRS", "GEODCRS"].iter().any(|p| text.starts_with(p)) {
            CrsKind::Geographic
        } else {
            CrsKind::Unknown
        };

        // The top-level authority comes last in WKT.
        let epsg = EPSG_AUTHORITY.captures_iter(wkt)
            .last()
            .and_then(|caps| caps[1].parse::<u32>().ok());
        if let Some(code) = epsg {
            let crs = Self::from_epsg(code);
            if crs.proj4.is_some() { return crs }
        }

        let names = text.replace('_', " ");
        let sirgas = names.contains("SIRGAS 2000") || names.contains("SIRGAS2000");
        let guess = match kind {
            CrsKind::Geographic => {
                if sirgas { Some(4674) }
                else if names.contains("WGS 1984") || names.contains("WGS 84") || names.contains("WGS84") { Some(4326) }
                else if names.contains("SOUTH AMERICAN DATUM 1969") || names.contains("SAD69") || names.contains("SAD 1969") { Some(4618) }
                else if names.contains("NORTH AMERICAN DATUM 1983") || names.contains("NAD83") { Some(4269) }
                else { None }
            }
            CrsKind::Projected => {
                if sirgas && names.contains("ALBERS") {
                    return Self { kind, epsg: None, proj4: Some(BRAZIL_ALBERS_PROJ4.to_string()) };
                }
                let utm = UTM_ZONE.captures(&names)
                    .and_then(|caps| Some((caps[1].parse::<u32>().ok()?, &caps[2] == "S")));
                match utm {
                    Some((zone, true)) if sirgas => Some(31960 + zone),
                    Some((zone, south)) if names.contains("WGS") => Some(if south { 32700 } else { 32600 } + zone),
                    _ if sirgas && names.contains("POLYCONIC") => Some(5880),
                    _ => None,
                }
            }
            CrsKind::Unknown => None,
        };

        match guess {
            Some(code) => Self::from_epsg(code),
            None => Self { kind, epsg, proj4: None },
        }
    }

    /// Interpret a GeoJSON legacy `crs.properties.name` value.
    pub fn from_urn(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Self::wgs84();
        }
        upper.rsplit(':')
            .next()
            .and_then(|code| code.parse::<u32>().ok())
            .map(Self::from_epsg)
            .unwrap_or_else(Self::unknown)
    }

    #[inline] pub fn kind(&self) -> CrsKind { self.kind }
    #[inline] pub fn epsg(&self) -> Option<u32> { self.epsg }
    #[inline] pub fn proj4(&self) -> Option<&str> { self.proj4.as_deref() }
    #[inline] pub fn is_geographic(&self) -> bool { self.kind == CrsKind::Geographic }

    /// Lon/lat on WGS 84 or on GRS 80 with a zero `towgs84` shift (SIRGAS 2000). These share
    /// coordinates; converting between them only adds ellipsoid round-off.
    fn is_wgs84_aligned(&self) -> bool {
        let Some(def) = self.proj4.as_deref().filter(|_| self.is_geographic()) else { return false };
        def.contains("+datum=WGS84")
            || def.contains("+ellps=WGS84")
            || (def.contains("+ellps=GRS80") && def.contains("+towgs84=0,0,0,0,0,0,0"))
    }

    /// Whether coordinates in `self` can be used unchanged as coordinates in `other`.
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        match (self.epsg, other.epsg) {
            (Some(a), Some(b)) if a == b => true,
            _ if self.is_wgs84_aligned() && other.is_wgs84_aligned() => true,
            _ => matches!((&self.proj4, &other.proj4), (Some(a), Some(b)) if a == b),
        }
    }

    /// Reproject shapes from `self` into `target`.
    ///
    /// When either side has no usable PROJ.4 definition the target is trusted and the shapes come
    /// back unchanged.
    pub fn reproject(&self, shapes: &[MultiPolygon<f64>], target: &Crs) -> Result<Vec<MultiPolygon<f64>>> {
        if self.is_equivalent(target) {
            return Ok(shapes.to_vec());
        }
        let (Some(from_def), Some(to_def)) = (self.proj4(), target.proj4()) else {
            log::warn!("cannot reproject from {self} to {target}; assuming coordinates already match");
            return Ok(shapes.to_vec());
        };

        let from = Proj4::from_proj_string(from_def)
            .map_err(|e| anyhow!("{e:?}"))
            .with_context(|| format!("failed to build source PROJ.4: {from_def}"))?;
        let to = Proj4::from_proj_string(to_def)
            .map_err(|e| anyhow!("{e:?}"))
            .with_context(|| format!("failed to build target PROJ.4: {to_def}"))?;

        let (src_geographic, dst_geographic) = (self.is_geographic(), target.is_geographic());
        log::debug!("reprojecting {} shapes from {self} to {target}", shapes.len());

        shapes.iter()
            .map(|shape| shape.try_map_coords(|coord: Coord<f64>| {
                // proj4rs works in radians for lon/lat systems.
                let mut point = if src_geographic {
                    (coord.x.to_radians(), coord.y.to_radians(), 0.0)
                } else {
                    (coord.x, coord.y, 0.0)
                };
                transform(&from, &to, &mut point)
                    .map_err(|e| anyhow!("CRS transform failed at ({}, {}): {e:?}", coord.x, coord.y))?;
                Ok(if dst_geographic {
                    Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
                } else {
                    Coord { x: point.0, y: point.1 }
                })
            }))
            .collect()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            CrsKind::Geographic => "geographic",
            CrsKind::Projected => "projected",
            CrsKind::Unknown => "unknown",
        };
        match (self.epsg, &self.proj4) {
            (Some(code), _) => write!(f, "EPSG:{code} ({kind})"),
            (None, Some(def)) => write!(f, "{def} ({kind})"),
            (None, None) => write!(f, "{kind} CRS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Centroid};

    const SIRGAS_ESRI: &str = r#"GEOGCS["GCS_SIRGAS_2000",DATUM["D_SIRGAS_2000",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    const SIRGAS_OGC: &str = r#"GEOGCS["SIRGAS 2000",DATUM["Sistema_de_Referencia_Geocentrico_para_las_AmericaS_2000",SPHEROID["GRS 1980",6378137,298.257222101,AUTHORITY["EPSG","7019"]],AUTHORITY["EPSG","6674"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4674"]]"#;

    const ALBERS_ESRI: &str = r#"PROJCS["SIRGAS_2000_Albers_Equal_Area_Brazil",GEOGCS["GCS_SIRGAS_2000",DATUM["D_SIRGAS_2000",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Albers"],UNIT["Meter",1.0]]"#;

    #[test]
    fn esri_wkt_without_authority_uses_datum_name() {
        let crs = Crs::from_wkt(SIRGAS_ESRI);
        assert_eq!(crs.kind(), CrsKind::Geographic);
        assert_eq!(crs.epsg(), Some(4674));
    }

    #[test]
    fn ogc_wkt_uses_top_level_authority() {
        let crs = Crs::from_wkt(SIRGAS_OGC);
        assert_eq!(crs.epsg(), Some(4674));
        assert!(crs.is_geographic());
    }

    #[test]
    fn projected_wkt_is_not_geographic() {
        let crs = Crs::from_wkt(ALBERS_ESRI);
        assert_eq!(crs.kind(), CrsKind::Projected);
        assert_eq!(crs.proj4(), Some(BRAZIL_ALBERS_PROJ4));
    }

    #[test]
    fn utm_zone_names_map_to_epsg() {
        let crs = Crs::from_wkt(r#"PROJCS["SIRGAS 2000 / UTM zone 22S",GEOGCS["SIRGAS 2000"]]"#);
        assert_eq!(crs.epsg(), Some(31982));
        let crs = Crs::from_wkt(r#"PROJCS["WGS_1984_UTM_Zone_21N",GEOGCS["GCS_WGS_1984"]]"#);
        assert_eq!(crs.epsg(), Some(32621));
    }

    #[test]
    fn garbage_wkt_is_unknown() {
        assert_eq!(Crs::from_wkt("not a crs"), Crs::unknown());
    }

    #[test]
    fn urn_names() {
        assert_eq!(Crs::from_urn("urn:ogc:def:crs:EPSG::4674").epsg(), Some(4674));
        assert_eq!(Crs::from_urn("EPSG:4326").epsg(), Some(4326));
        assert_eq!(Crs::from_urn("urn:ogc:def:crs:OGC:1.3:CRS84"), Crs::wgs84());
        assert_eq!(Crs::from_urn("whatever").kind(), CrsKind::Unknown);
    }

    #[test]
    fn equivalent_crs_is_a_no_op() {
        let shape = MultiPolygon(vec![polygon![(x: -50.0, y: -10.0), (x: -49.0, y: -10.0), (x: -49.0, y: -9.0)]]);
        let out = Crs::wgs84().reproject(std::slice::from_ref(&shape), &Crs::wgs84()).unwrap();
        assert_eq!(out, vec![shape]);
    }

    #[test]
    fn wgs84_and_sirgas_2000_share_coordinates() {
        let (wgs84, sirgas) = (Crs::wgs84(), Crs::from_epsg(4674));
        assert!(wgs84.is_equivalent(&sirgas));
        assert!(sirgas.is_equivalent(&wgs84));
        assert!(Crs::from_wkt(SIRGAS_ESRI).is_equivalent(&wgs84));
        assert!(!Crs::from_epsg(4618).is_equivalent(&wgs84));
        assert!(!Crs::from_epsg(31982).is_equivalent(&sirgas));

        let shape = MultiPolygon(vec![polygon![(x: -52.0, y: -3.1), (x: -51.9, y: -3.1), (x: -51.9, y: -3.0), (x: -52.0, y: -3.0)]]);
        let out = wgs84.reproject(std::slice::from_ref(&shape), &sirgas).unwrap();
        assert_eq!(out, vec![shape]);
    }

    #[test]
    fn unknown_source_trusts_target() {
        let shape = MultiPolygon(vec![polygon![(x: 1.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 2.0)]]);
        let out = Crs::unknown().reproject(std::slice::from_ref(&shape), &Crs::from_epsg(4674)).unwrap();
        assert_eq!(out, vec![shape]);
    }

    #[test]
    fn projected_to_geographic_round_trip_lands_near_origin() {
        let lonlat = MultiPolygon(vec![polygon![
            (x: -54.0, y: -12.0), (x: -53.99, y: -12.0), (x: -53.99, y: -11.99), (x: -54.0, y: -11.99),
        ]]);
        let albers = Crs::from_wkt(ALBERS_ESRI);
        let sirgas = Crs::from_epsg(4674);

        let projected = sirgas.reproject(std::slice::from_ref(&lonlat), &albers).unwrap();
        let c = projected[0].centroid().unwrap();
        // lon_0/lat_0 of the projection sit at the false origin.
        assert!((c.x() - 5_000_000.0).abs() < 2_000.0);
        assert!((c.y() - 10_000_000.0).abs() < 2_000.0);

        let back = albers.reproject(&projected, &sirgas).unwrap();
        let c = back[0].centroid().unwrap();
        assert!((c.x() - -53.995).abs() < 1e-5);
        assert!((c.y() - -11.995).abs() < 1e-5);
    }
}
