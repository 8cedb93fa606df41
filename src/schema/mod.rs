//! Schema reconciliation.
//!
//! Each dataset declares a static [`SchemaMapping`]: for every canonical field,
//! the source header names it may appear under, in priority order. A mapping is
//! resolved against a table's headers once, at load time, producing a
//! [`ResolvedSchema`] of column indices that the cleaner reads rows through.

pub mod normalize;
pub mod raw;

pub use raw::{RawRow, RawTable};

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, warn};

use crate::datasets::Dataset;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub field: &'static str,
    pub sources: &'static [&'static str],
    pub required: bool,
}

impl ColumnSpec {
    pub const fn required(field: &'static str, sources: &'static [&'static str]) -> Self {
        Self {
            field,
            sources,
            required: true,
        }
    }

    pub const fn optional(field: &'static str, sources: &'static [&'static str]) -> Self {
        Self {
            field,
            sources,
            required: false,
        }
    }
}

#[derive(Debug)]
pub struct SchemaMapping {
    pub dataset: Dataset,
    pub columns: &'static [ColumnSpec],
}

impl SchemaMapping {
    /// Checks the declaration itself: unique field names, at least one source each.
    pub fn validate(&self) -> Result<()> {
        let mut fields = HashSet::new();
        for column in self.columns {
            if !fields.insert(column.field) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} mapping declares field '{}' twice",
                    self.dataset, column.field
                )));
            }
            if column.sources.is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} mapping has no source columns for '{}'",
                    self.dataset, column.field
                )));
            }
        }
        Ok(())
    }

    /// Resolves every declared field to a header index.
    ///
    /// Headers match case-insensitively after trimming. When several declared
    /// sources are present, the first in declaration order wins.
    pub fn resolve(&self, headers: &[String]) -> Result<ResolvedSchema> {
        let mut by_name: HashMap<String, usize> = HashMap::new();
        for (index, header) in headers.iter().enumerate() {
            by_name
                .entry(header.trim().to_ascii_lowercase())
                .or_insert(index);
        }

        let mut columns = BTreeMap::new();
        let mut missing = Vec::new();

        for column in self.columns {
            let mut found = column
                .sources
                .iter()
                .filter_map(|source| by_name.get(&source.to_ascii_lowercase()).map(|&i| (*source, i)));

            match found.next() {
                Some((source, index)) => {
                    let shadowed: Vec<&str> = found.map(|(s, _)| s).collect();
                    if !shadowed.is_empty() {
                        debug!(
                            dataset = %self.dataset,
                            field = column.field,
                            used = source,
                            ?shadowed,
                            "Multiple source columns present, using first declared"
                        );
                    }
                    columns.insert(column.field, index);
                }
                None if column.required => missing.push(column),
                None => {}
            }
        }

        if !missing.is_empty() {
            let detail = missing
                .iter()
                .map(|c| format!("'{}' (tried {})", c.field, c.sources.join(", ")))
                .collect::<Vec<_>>()
                .join("; ");
            warn!(dataset = %self.dataset, ?headers, "Required columns not found");
            return Err(PipelineError::SchemaMismatch {
                dataset: self.dataset,
                detail: format!("missing required column(s): {detail}"),
            });
        }

        Ok(ResolvedSchema {
            dataset: self.dataset,
            columns,
        })
    }
}

/// Field name -> column index for one concrete table.
#[derive(Debug, Clone)]
pub struct ResolvedSchema {
    pub dataset: Dataset,
    columns: BTreeMap<&'static str, usize>,
}

impl ResolvedSchema {
    pub fn has(&self, field: &str) -> bool {
        self.columns.contains_key(field)
    }

    /// Raw trimmed cell for `field`; `None` when the column is absent or the cell is empty.
    pub fn cell<'r>(&self, row: &'r RawRow, field: &str) -> Option<&'r str> {
        let index = *self.columns.get(field)?;
        row.fields
            .get(index)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn text(&self, row: &RawRow, field: &str) -> Option<String> {
        self.cell(row, field).and_then(normalize::clean_text)
    }

    pub fn number(&self, row: &RawRow, field: &str) -> Option<f64> {
        self.cell(row, field).and_then(normalize::parse_number)
    }

    pub fn percentage(&self, row: &RawRow, field: &str) -> Option<f64> {
        self.cell(row, field).and_then(normalize::parse_percentage)
    }

    pub fn count(&self, row: &RawRow, field: &str) -> Option<u32> {
        self.cell(row, field).and_then(normalize::parse_count)
    }

    pub fn year(&self, row: &RawRow, field: &str) -> Option<i32> {
        self.cell(row, field).and_then(normalize::parse_year)
    }

    pub fn postal_code(&self, row: &RawRow, field: &str) -> Option<String> {
        self.cell(row, field).and_then(normalize::normalize_postal_code)
    }
}
