//! One batch run: load boundaries, clean every dataset, aggregate, write outputs.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::aggregate::{CleanedTables, aggregate, enrich_boundaries};
use crate::config::PipelineConfig;
use crate::datasets::{
    self, CleanedTable, Dataset, Diagnostics, crime, demographics, open_space, property, restaurants, schools,
    transit,
};
use crate::error::{PipelineError, Result};
use crate::output;
use crate::schema::RawTable;
use crate::spatial::{Attributor, BoundarySet};

pub const SUMMARY_FILE: &str = "neighborhood_summary.csv";
pub const ENRICHED_BOUNDARIES_FILE: &str = "neighborhood-boundaries_enriched.geojson";
pub const REPORT_FILE: &str = "run_report.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Ok,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetReport {
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantine: Option<PathBuf>,
}

impl DatasetReport {
    fn failed(error: &PipelineError) -> Self {
        Self {
            status: StageStatus::Failed,
            error: Some(error.to_string()),
            diagnostics: None,
            output: None,
            quarantine: None,
        }
    }
}

/// Written to `run_report.json` at the end of every run, including failed ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub datasets: BTreeMap<Dataset, DatasetReport>,
    pub neighborhoods: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            generated_at: Utc::now(),
            datasets: BTreeMap::new(),
            neighborhoods: 0,
            error: None,
        }
    }

    pub fn succeeded(&self, dataset: Dataset) -> bool {
        self.datasets
            .get(&dataset)
            .is_some_and(|d| d.status == StageStatus::Ok)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage. A failing dataset is logged and left out; only an
    /// empty aggregate or an unwritable summary fails the whole run.
    #[instrument(skip_all, fields(raw_dir = %self.config.raw_dir.display(), processed_dir = %self.config.processed_dir.display()))]
    pub fn run(&self) -> Result<RunReport> {
        datasets::validate_mappings()?;
        std::fs::create_dir_all(&self.config.processed_dir)?;

        let mut report = RunReport::new();
        let boundaries = self.load_boundaries(&mut report);
        let attributor = Attributor::new(&boundaries, &self.config);
        let open_space_members = OnceCell::new();

        let tables = CleanedTables {
            property: self.tabular(&mut report, Dataset::Property, |path| {
                property::clean(RawTable::read(Dataset::Property, path)?, &attributor)
            }),
            crime: self.tabular(&mut report, Dataset::Crime, |path| {
                crime::clean(RawTable::read(Dataset::Crime, path)?, &attributor)
            }),
            demographics: self.tabular(&mut report, Dataset::Demographics, |path| {
                let path = demographics_source(path);
                demographics::clean(RawTable::read(Dataset::Demographics, &path)?, &attributor)
            }),
            schools: self.tabular(&mut report, Dataset::Schools, |path| {
                schools::clean(RawTable::read(Dataset::Schools, path)?, &attributor)
            }),
            transit: self.tabular(&mut report, Dataset::Transit, |path| {
                let raw = RawTable::read_zip_entry(Dataset::Transit, path, transit::STOPS_ENTRY)?;
                transit::clean(raw, &attributor)
            }),
            restaurants: self.tabular(&mut report, Dataset::Restaurants, |path| {
                restaurants::clean(RawTable::read(Dataset::Restaurants, path)?, &attributor)
            }),
            open_space: self.stage(
                &mut report,
                Dataset::OpenSpace,
                |path| {
                    let collection = open_space::read(path)?;
                    let _ = open_space_members.set(collection.foreign_members.clone());
                    open_space::clean(collection, &attributor)
                },
                |path, table| {
                    let members = open_space_members.get().cloned().flatten();
                    output::write_feature_collection(path, &open_space::to_collection(&table.rows, members))
                },
            ),
        };

        let result = self.summarize(&tables, &boundaries, &mut report);
        if let Err(e) = &result {
            error!(error = %e, "Aggregation failed");
            report.error = Some(e.to_string());
        }
        output::write_json(&self.config.processed_path(REPORT_FILE), &report)?;
        result?;

        info!(
            neighborhoods = report.neighborhoods,
            failed = report.datasets.values().filter(|d| d.status == StageStatus::Failed).count(),
            "Pipeline run complete"
        );
        Ok(report)
    }

    /// Loads the boundary set. Any failure degrades to an empty set, which
    /// sends every record through the postal and name fallbacks.
    #[instrument(skip_all)]
    fn load_boundaries(&self, report: &mut RunReport) -> BoundarySet {
        let path = self.config.raw_path(Dataset::Boundaries);
        let loaded = BoundarySet::load(&path, &self.config.boundary_name_keys).and_then(|set| {
            let output_path = self.config.processed_path(Dataset::Boundaries.cleaned_file());
            output::write_feature_collection(&output_path, set.collection())?;
            Ok((set, output_path))
        });

        match loaded {
            Ok((set, output_path)) => {
                let diagnostics = Diagnostics {
                    rows_read: set.collection().features.len() + set.duplicates_dropped(),
                    duplicates_dropped: set.duplicates_dropped(),
                    rows_written: set.collection().features.len(),
                    ..Default::default()
                };
                report.datasets.insert(
                    Dataset::Boundaries,
                    DatasetReport {
                        status: StageStatus::Ok,
                        error: None,
                        diagnostics: Some(diagnostics),
                        output: Some(output_path),
                        quarantine: None,
                    },
                );
                set
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Neighborhood boundaries unavailable, falling back to postal codes");
                report.datasets.insert(Dataset::Boundaries, DatasetReport::failed(&e));
                BoundarySet::empty()
            }
        }
    }

    fn tabular<T: Serialize + DeserializeOwned>(
        &self,
        report: &mut RunReport,
        dataset: Dataset,
        clean: impl FnOnce(&Path) -> Result<CleanedTable<T>>,
    ) -> Option<CleanedTable<T>> {
        self.stage(report, dataset, clean, |path, table| output::write_table(path, &table.rows))
    }

    /// Cleans and writes one dataset. Errors are logged and recorded in the
    /// report; the dataset is then absent from aggregation.
    #[instrument(skip_all, fields(%dataset))]
    fn stage<T>(
        &self,
        report: &mut RunReport,
        dataset: Dataset,
        clean: impl FnOnce(&Path) -> Result<CleanedTable<T>>,
        write: impl FnOnce(&Path, &CleanedTable<T>) -> Result<()>,
    ) -> Option<CleanedTable<T>> {
        let source = self.config.raw_path(dataset);
        let output_path = self.config.processed_path(dataset.cleaned_file());

        let result = clean(&source).and_then(|table| {
            write(&output_path, &table)?;
            let quarantine =
                output::write_quarantine(&self.config.quarantine_dir(), dataset, &table.diagnostics.quarantined)?;
            Ok((table, quarantine))
        });

        match result {
            Ok((table, quarantine)) => {
                report.datasets.insert(
                    dataset,
                    DatasetReport {
                        status: StageStatus::Ok,
                        error: None,
                        diagnostics: Some(table.diagnostics.clone()),
                        output: Some(output_path),
                        quarantine,
                    },
                );
                Some(table)
            }
            Err(e) => {
                error!(%dataset, source = %source.display(), error = %e, "Dataset stage failed");
                report.datasets.insert(dataset, DatasetReport::failed(&e));
                None
            }
        }
    }

    #[instrument(skip_all)]
    fn summarize(&self, tables: &CleanedTables, boundaries: &BoundarySet, report: &mut RunReport) -> Result<()> {
        let summaries = aggregate(tables)?;
        output::write_table(&self.config.processed_path(SUMMARY_FILE), &summaries)?;
        report.neighborhoods = summaries.len();

        if boundaries.is_empty() {
            warn!("No boundary polygons loaded, skipping boundary enrichment");
            return Ok(());
        }
        let enriched = enrich_boundaries(boundaries, &summaries)?;
        output::write_feature_collection(&self.config.processed_path(ENRICHED_BOUNDARIES_FILE), &enriched)?;
        Ok(())
    }
}

/// The demographics extract may be published as a spreadsheet or as CSV;
/// when the configured file is missing a same-named `.csv` is tried.
fn demographics_source(configured: &Path) -> PathBuf {
    if configured.exists() {
        return configured.to_path_buf();
    }
    let csv = configured.with_extension("csv");
    if csv.exists() {
        info!(path = %csv.display(), "Using CSV demographics extract");
        csv
    } else {
        configured.to_path_buf()
    }
}
