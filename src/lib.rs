//! Neighborhood attribution and aggregation over Boston open-data extracts.
//!
//! Raw extracts are cleaned per dataset ([`datasets`]), every record is
//! attributed to a neighborhood ([`spatial`]), and the cleaned tables are
//! rolled up into one summary row per neighborhood ([`aggregate`]).
//! [`pipeline::Pipeline`] runs the whole batch; [`query`] serves read-only
//! views over its outputs.

pub mod aggregate;
pub mod config;
pub mod datasets;
pub mod error;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod spatial;
pub mod stats;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, RunReport};
