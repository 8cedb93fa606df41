use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::datasets::Dataset;

/// Error type for source loading, schema reconciliation, and aggregation failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source for {dataset} is unavailable at {}: {source}", path.display())]
    SourceUnavailable {
        dataset: Dataset,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("schema mismatch in {dataset}: {detail}")]
    SchemaMismatch { dataset: Dataset, detail: String },
    #[error("archive for {dataset} has no entry named '{entry}'")]
    MissingArchiveEntry { dataset: Dataset, entry: String },
    #[error("spreadsheet for {dataset} has no worksheets")]
    EmptyWorkbook { dataset: Dataset },
    #[error("no cleaned tables available to aggregate")]
    NothingToAggregate,
    #[error("neighborhood '{0}' not found")]
    NeighborhoodNotFound(String),
    #[error("configuration error: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Spreadsheet(#[from] calamine::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
