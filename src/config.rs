//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is built once per process (from a JSON file, the
//! environment, or defaults) and passed explicitly to every component.
//!
//! ```json
//! {
//!   "raw_dir": "data/raw",
//!   "processed_dir": "data/processed",
//!   "postal_codes": { "02445": "Brookline" },
//!   "neighborhood_aliases": { "Allston-Brighton": "Allston" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::datasets::Dataset;
use crate::error::{PipelineError, Result};

pub const RAW_DIR_ENV: &str = "NBHD_RAW_DIR";
pub const PROCESSED_DIR_ENV: &str = "NBHD_PROCESSED_DIR";

/// File names of each raw extract, relative to `raw_dir`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SourceFiles {
    pub property: String,
    pub crime: String,
    pub demographics: String,
    pub schools: String,
    pub transit: String,
    pub restaurants: String,
    pub boundaries: String,
    pub open_space: String,
}

impl Default for SourceFiles {
    fn default() -> Self {
        Self {
            property: "property-assessment-fy2025.csv".into(),
            crime: "crime-incident-reports.csv".into(),
            demographics: "neighborhood-demographics.xlsx".into(),
            schools: "schools.csv".into(),
            transit: "mbta-gtfs.zip".into(),
            restaurants: "restaurant-inspections.csv".into(),
            boundaries: "boston-neighborhoods.geojson".into(),
            open_space: "open-space.geojson".into(),
        }
    }
}

impl SourceFiles {
    pub fn for_dataset(&self, dataset: Dataset) -> &str {
        match dataset {
            Dataset::Property => &self.property,
            Dataset::Crime => &self.crime,
            Dataset::Demographics => &self.demographics,
            Dataset::Schools => &self.schools,
            Dataset::Transit => &self.transit,
            Dataset::Restaurants => &self.restaurants,
            Dataset::Boundaries => &self.boundaries,
            Dataset::OpenSpace => &self.open_space,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub sources: SourceFiles,
    /// Download URL per raw file name.
    pub source_urls: BTreeMap<String, String>,
    pub download_attempts: u32,
    /// Property keys tried, in order, for the boundary feature name.
    pub boundary_name_keys: Vec<String>,
    /// Extra or overriding ZIP code mappings, merged over the built-in table.
    pub postal_codes: BTreeMap<String, String>,
    /// Variant spelling -> canonical neighborhood name.
    pub neighborhood_aliases: BTreeMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            sources: SourceFiles::default(),
            source_urls: default_source_urls(),
            download_attempts: 3,
            boundary_name_keys: ["Name", "neighborhood", "NEIGHBORHO", "name"]
                .into_iter()
                .map(String::from)
                .collect(),
            postal_codes: BTreeMap::new(),
            neighborhood_aliases: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `NBHD_RAW_DIR` / `NBHD_PROCESSED_DIR` overrides from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(RAW_DIR_ENV) {
            self.raw_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var(PROCESSED_DIR_ENV) {
            self.processed_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.boundary_name_keys.iter().all(|k| k.trim().is_empty()) {
            return Err(PipelineError::InvalidConfig(
                "boundary_name_keys must name at least one property".into(),
            ));
        }
        if self.download_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "download_attempts must be at least 1".into(),
            ));
        }
        if let Some(code) = self
            .postal_codes
            .keys()
            .find(|code| code.len() != 5 || !code.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(PipelineError::InvalidConfig(format!(
                "postal code '{code}' is not a 5-digit code"
            )));
        }
        Ok(())
    }

    pub fn raw_path(&self, dataset: Dataset) -> PathBuf {
        self.raw_dir.join(self.sources.for_dataset(dataset))
    }

    pub fn processed_path(&self, file_name: &str) -> PathBuf {
        self.processed_dir.join(file_name)
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.processed_dir.join("quarantine")
    }
}

fn default_source_urls() -> BTreeMap<String, String> {
    let sources = SourceFiles::default();
    [
        (
            sources.property,
            "https://data.boston.gov/dataset/e02c44d2-3c64-459c-8fe2-e1ce5f38a035/resource/6b7e460e-33f6-4e61-80bc-1bef2e73ac54/download/fy2025-property-assessment-data_12_30_2024.csv",
        ),
        (
            sources.crime,
            "https://data.boston.gov/dataset/6220d948-eae2-4e4b-8723-2dc8e67722a3/resource/b973d8cb-eeb2-4e7e-99da-c92938efc9c0/download/tmp310wm06c.csv",
        ),
        (
            sources.demographics,
            "https://data.boston.gov/dataset/8202abf2-8434-4934-959b-94643c7dac18/resource/7154cc09-55c4-4acd-99a5-3a233d11e699/download/neighborhoodsummaryclean_1950-2010.xlsx",
        ),
        (
            sources.open_space,
            "https://data.boston.gov/dataset/66a3324e-066f-4caf-897b-a2b4dcb8bc42/resource/ccc038ce-5602-42d0-b4c6-87f60c116ea3/download/open_space.geojson",
        ),
        (
            sources.schools,
            "https://data.boston.gov/dataset/4df4b9c7-239d-4643-ac21-a22b42c832df/resource/6ceeff38-a0db-46df-b5be-f8cfdea0186d/download/public_schools.csv",
        ),
        (sources.transit, "https://cdn.mbta.com/MBTA_GTFS.zip"),
        (
            sources.restaurants,
            "https://data.boston.gov/dataset/5e4182e3-ba1e-4511-88f8-08a70383e1b6/resource/f1e13724-284d-478c-b8bc-ef042aa5b70b/download/tmpcx_lnkre.csv",
        ),
        (
            sources.boundaries,
            "https://data.boston.gov/dataset/5997399b-c665-4600-848f-a2a32834f009/resource/42a271c9-486d-4f9e-adc2-63e4bf47fe3e/download/boston_neighborhood_boundaries_approximated_by_2020_census_tracts.geojson",
        ),
    ]
    .into_iter()
    .map(|(file, url)| (file, url.to_string()))
    .collect()
}
