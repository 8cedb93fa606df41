//! Per-dataset cleaning.
//!
//! Every cleaner follows the same order: drop exact duplicates, drop rows
//! missing join-critical fields, normalize numeric fields, attribute a
//! neighborhood, then compute dataset-specific derived fields.

pub mod crime;
pub mod demographics;
pub mod open_space;
pub mod property;
pub mod restaurants;
pub mod schools;
pub mod transit;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::schema::{RawRow, RawTable, ResolvedSchema, SchemaMapping};
use crate::spatial::{Attribution, NeighborhoodKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Property,
    Crime,
    Demographics,
    Schools,
    Transit,
    Restaurants,
    OpenSpace,
    Boundaries,
}

impl Dataset {
    pub fn name(self) -> &'static str {
        match self {
            Dataset::Property => "property_assessment",
            Dataset::Crime => "crime_incidents",
            Dataset::Demographics => "demographics",
            Dataset::Schools => "schools",
            Dataset::Transit => "transit_stops",
            Dataset::Restaurants => "restaurant_inspections",
            Dataset::OpenSpace => "open_space",
            Dataset::Boundaries => "neighborhood_boundaries",
        }
    }

    /// File name of the cleaned output under the processed directory.
    pub fn cleaned_file(self) -> &'static str {
        match self {
            Dataset::Property => "property-assessment-fy2025_clean.csv",
            Dataset::Crime => "crime-incident-reports_clean.csv",
            Dataset::Demographics => "neighborhood-demographics_clean.csv",
            Dataset::Schools => "schools_clean.csv",
            Dataset::Transit => "mbta_stops_clean.csv",
            Dataset::Restaurants => "restaurant-inspections_clean.csv",
            Dataset::OpenSpace => "open-space_clean.geojson",
            Dataset::Boundaries => "boston-neighborhoods_clean.geojson",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The schema mappings of every tabular dataset.
pub fn mappings() -> [&'static SchemaMapping; 6] {
    [
        &property::SCHEMA,
        &crime::SCHEMA,
        &demographics::SCHEMA,
        &schools::SCHEMA,
        &transit::SCHEMA,
        &restaurants::SCHEMA,
    ]
}

/// Validates every declared mapping; run once before any extract is read.
pub fn validate_mappings() -> Result<()> {
    mappings().iter().try_for_each(|mapping| mapping.validate())
}

/// Records that carry a (possibly absent) neighborhood.
pub trait Attributed {
    fn neighborhood(&self) -> Option<&NeighborhoodKey>;
}

/// A row rejected by validation, kept for the quarantine file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuarantinedRow {
    pub line: usize,
    pub reason: String,
    pub raw: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostics {
    pub rows_read: usize,
    pub duplicates_dropped: usize,
    pub missing_required: usize,
    pub rejected: usize,
    pub attributed_by_polygon: usize,
    pub attributed_by_postal_code: usize,
    pub attributed_by_name: usize,
    pub unattributed: usize,
    pub rows_written: usize,
    #[serde(skip)]
    pub quarantined: Vec<QuarantinedRow>,
}

impl Diagnostics {
    pub fn quarantine(&mut self, row: &RawRow, reason: impl Into<String>) {
        self.rejected += 1;
        self.quarantined.push(QuarantinedRow {
            line: row.line,
            reason: reason.into(),
            raw: row.fields.join(","),
        });
    }

    pub fn record_attribution(&mut self, via: Attribution) {
        match via {
            Attribution::Polygon => self.attributed_by_polygon += 1,
            Attribution::PostalCode => self.attributed_by_postal_code += 1,
            Attribution::Name => self.attributed_by_name += 1,
            Attribution::Unmatched => self.unattributed += 1,
        }
    }

    pub fn attributed(&self) -> usize {
        self.attributed_by_polygon + self.attributed_by_postal_code + self.attributed_by_name
    }
}

/// One cleaned, neighborhood-tagged table plus what happened while building it.
#[derive(Debug, Clone)]
pub struct CleanedTable<T> {
    pub dataset: Dataset,
    pub rows: Vec<T>,
    pub diagnostics: Diagnostics,
}

impl<T> CleanedTable<T> {
    pub fn new(dataset: Dataset, rows: Vec<T>, mut diagnostics: Diagnostics) -> Self {
        diagnostics.rows_written = rows.len();
        info!(
            %dataset,
            rows_read = diagnostics.rows_read,
            duplicates = diagnostics.duplicates_dropped,
            missing_required = diagnostics.missing_required,
            rejected = diagnostics.rejected,
            attributed = diagnostics.attributed(),
            unattributed = diagnostics.unattributed,
            rows_written = diagnostics.rows_written,
            "Dataset cleaned"
        );
        Self {
            dataset,
            rows,
            diagnostics,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Steps shared by every tabular cleaner: resolve the schema against the
/// headers, then drop exact-duplicate rows.
pub(crate) fn prepare(
    mapping: &SchemaMapping,
    raw: &mut RawTable,
    diagnostics: &mut Diagnostics,
) -> Result<ResolvedSchema> {
    let schema = mapping.resolve(&raw.headers)?;
    diagnostics.rows_read = raw.len();
    diagnostics.duplicates_dropped = raw.drop_duplicates();
    debug!(
        dataset = %mapping.dataset,
        rows = raw.len(),
        duplicates = diagnostics.duplicates_dropped,
        "Schema resolved and duplicates dropped"
    );
    Ok(schema)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::RawTable;

    /// Builds a raw table from CSV text.
    pub(crate) fn raw(csv: &str) -> RawTable {
        RawTable::from_csv_reader(csv.as_bytes()).unwrap()
    }

    #[test]
    fn test_all_mappings_validate() {
        validate_mappings().unwrap();
    }

    #[test]
    fn test_cleaned_file_names_are_distinct() {
        let all = [
            Dataset::Property,
            Dataset::Crime,
            Dataset::Demographics,
            Dataset::Schools,
            Dataset::Transit,
            Dataset::Restaurants,
            Dataset::OpenSpace,
            Dataset::Boundaries,
        ];
        let files: std::collections::HashSet<_> = all.iter().map(|d| d.cleaned_file()).collect();
        assert_eq!(files.len(), all.len());
    }

    #[test]
    fn test_quarantine_counts_rejections() {
        let mut diagnostics = Diagnostics::default();
        let row = RawRow {
            line: 7,
            fields: vec!["a".into(), "b".into()],
        };
        diagnostics.quarantine(&row, "missing identifier");
        assert_eq!(diagnostics.rejected, 1);
        assert_eq!(diagnostics.quarantined[0].line, 7);
        assert_eq!(diagnostics.quarantined[0].raw, "a,b");
    }
}
