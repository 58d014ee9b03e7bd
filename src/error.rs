use std::path::PathBuf;

/// Fatal conditions that abort a run.
///
/// Everything else bubbles up as a plain `anyhow` error with context; these variants exist so
/// callers can tell the failure classes apart with `downcast_ref`.
#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    /// No complete shapefile family (.shp/.shx/.dbf) in a required directory.
    #[error("no {what} found in {}", dir.display())]
    MissingInput { dir: PathBuf, what: &'static str },

    #[error("reference file not found: {}", path.display())]
    ReferenceNotFound { path: PathBuf },

    #[error("unsupported vector format (expected .shp, .gpkg, .geojson or .json): {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// Geodesic distances need lon/lat degrees.
    #[error("geodesic distance requires geographic (lon/lat) coordinates, layer CRS is {crs}")]
    NonGeographicCrs { crs: String },

    #[error("survey years must differ, got {0} twice")]
    SameSurveyYear(u32),

    #[error("output directory already exists: {}", path.display())]
    OutputExists { path: PathBuf },
}
