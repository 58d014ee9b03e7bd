use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::DriftError;

/// The three years a run touches. `earlier < later` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurveyYears {
    pub earlier: u32,
    pub later: u32,
    /// Year whose directory holds one subdirectory per state.
    pub latest: u32,
}

impl SurveyYears {
    /// Order the two survey years numerically. Equal survey years are rejected.
    pub fn new(year1: u32, year2: u32, latest: u32) -> Result<Self> {
        if year1 == year2 {
            return Err(DriftError::SameSurveyYear(year1).into());
        }
        let (earlier, later) = if year1 < year2 { (year1, year2) } else { (year2, year1) };
        Ok(Self { earlier, later, latest })
    }

    /// Parse the three positional year arguments.
    pub fn parse(year1: &str, year2: &str, latest: &str) -> Result<Self> {
        fn parse_year(s: &str) -> Result<u32> {
            s.trim().parse().with_context(|| format!("invalid year: {s:?}"))
        }
        Self::new(parse_year(year1)?, parse_year(year2)?, parse_year(latest)?)
    }

    /// Distinct years in load order: earlier, later, then latest if it is a third year.
    pub fn distinct(&self) -> Vec<u32> {
        let mut years = vec![self.earlier, self.later];
        if !years.contains(&self.latest) {
            years.push(self.latest);
        }
        years
    }

    /// Whether `year` uses the per-state directory layout.
    #[inline] pub fn is_latest(&self, year: u32) -> bool { year == self.latest }
}

/// Immutable run configuration, built once at entry and passed into each stage.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub years: SurveyYears,
    pub sicar_root: PathBuf,
    pub reference_path: PathBuf,
    pub reference_id_field: String,
    pub outputs_root: PathBuf,
}

impl RunConfig {
    pub const DEFAULT_DATA_ROOT: &'static str = "./data";
    pub const DEFAULT_OUTPUTS_ROOT: &'static str = "./outputs";
    pub const DEFAULT_REFERENCE_ID_FIELD: &'static str = "uuid";

    /// Configuration using the standard layout under `data_root`:
    /// `{data_root}/SICAR/{year}` and `{data_root}/PRODES/prodes_amazonia_nb.gpkg`.
    pub fn new(years: SurveyYears, data_root: &Path) -> Self {
        Self {
            years,
            sicar_root: data_root.join("SICAR"),
            reference_path: data_root.join("PRODES").join("prodes_amazonia_nb.gpkg"),
            reference_id_field: Self::DEFAULT_REFERENCE_ID_FIELD.to_string(),
            outputs_root: PathBuf::from(Self::DEFAULT_OUTPUTS_ROOT),
        }
    }

    pub fn with_reference(mut self, path: PathBuf) -> Self {
        self.reference_path = path;
        self
    }

    pub fn with_reference_id_field(mut self, field: impl Into<String>) -> Self {
        self.reference_id_field = field.into();
        self
    }

    pub fn with_outputs_root(mut self, path: PathBuf) -> Self {
        self.outputs_root = path;
        self
    }

    /// Directory holding one year's parcel data.
    #[inline] pub fn year_dir(&self, year: u32) -> PathBuf { self.sicar_root.join(year.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survey_years_are_ordered() {
        let years = SurveyYears::parse("2022", "2019", "2025").unwrap();
        assert_eq!(years.earlier, 2019);
        assert_eq!(years.later, 2022);
        assert_eq!(years.distinct(), vec![2019, 2022, 2025]);
    }

    #[test]
    fn latest_may_coincide_with_later() {
        let years = SurveyYears::new(2019, 2025, 2025).unwrap();
        assert_eq!(years.distinct(), vec![2019, 2025]);
        assert!(years.is_latest(2025));
        assert!(!years.is_latest(2019));
    }

    #[test]
    fn equal_survey_years_are_rejected() {
        let err = SurveyYears::new(2020, 2020, 2025).unwrap_err();
        assert!(matches!(err.downcast_ref::<DriftError>(), Some(DriftError::SameSurveyYear(2020))));
    }

    #[test]
    fn non_numeric_year_is_rejected() {
        assert!(SurveyYears::parse("twenty", "2019", "2025").is_err());
    }

    #[test]
    fn default_layout_paths() {
        let years = SurveyYears::new(2019, 2022, 2025).unwrap();
        let config = RunConfig::new(years, Path::new("/data"));
        assert_eq!(config.year_dir(2019), PathBuf::from("/data/SICAR/2019"));
        assert_eq!(config.reference_path, PathBuf::from("/data/PRODES/prodes_amazonia_nb.gpkg"));
        assert_eq!(config.reference_id_field, "uuid");
    }
}
