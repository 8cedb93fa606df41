//! Untyped tables read from the source extracts.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use csv::ReaderBuilder;
use tracing::debug;
use zip::ZipArchive;

use crate::datasets::Dataset;
use crate::error::{PipelineError, Result};

/// One source row plus its 1-based line number in the extract (header = line 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub line: usize,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Builds a table from headers and rows numbered from line 2, padding
    /// short rows to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let numbered = rows.into_iter().enumerate().map(|(i, fields)| (i + 2, fields)).collect();
        Self::with_lines(headers, numbered)
    }

    /// Like [`RawTable::new`], but with the source line of every row given.
    pub fn with_lines(headers: Vec<String>, rows: Vec<(usize, Vec<String>)>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|(line, mut fields)| {
                if fields.len() < width {
                    fields.resize(width, String::new());
                }
                RawRow { line, fields }
            })
            .collect();
        Self { headers, rows }
    }

    /// Reads comma-separated text with a header row. Invalid UTF-8 is replaced
    /// rather than failing the whole table.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr
            .byte_headers()?
            .iter()
            .map(|h| {
                String::from_utf8_lossy(h)
                    .trim_start_matches('\u{feff}')
                    .trim()
                    .to_string()
            })
            .collect();

        let mut rows = Vec::new();
        for (i, record) in rdr.byte_records().enumerate() {
            let record = record?;
            // Quoted fields may span lines, so the reader's position is authoritative.
            let line = record.position().map_or(i + 2, |p| p.line() as usize);
            let fields = record
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect();
            rows.push((line, fields));
        }

        Ok(Self::with_lines(headers, rows))
    }

    /// Reads a delimited-text extract, or a spreadsheet when the extension says so.
    pub fn read(dataset: Dataset, path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("xlsx" | "xlsm" | "xls" | "ods") => Self::read_spreadsheet(dataset, path),
            _ => Self::from_csv_reader(open_source(dataset, path)?),
        }
    }

    /// Reads the entry whose file name is `entry` (in any directory) from a zip archive.
    pub fn read_zip_entry(dataset: Dataset, path: &Path, entry: &str) -> Result<Self> {
        let mut archive = ZipArchive::new(open_source(dataset, path)?)?;
        let name = archive
            .file_names()
            .find(|name| Path::new(name).file_name() == Some(OsStr::new(entry)))
            .map(str::to_string)
            .ok_or_else(|| PipelineError::MissingArchiveEntry {
                dataset,
                entry: entry.to_string(),
            })?;

        debug!(%dataset, archive_entry = %name, "Reading archive entry");
        let file = archive.by_name(&name)?;
        Self::from_csv_reader(file)
    }

    /// Reads the first worksheet of a workbook; its first row is the header.
    pub fn read_spreadsheet(dataset: Dataset, path: &Path) -> Result<Self> {
        std::fs::metadata(path).map_err(|source| PipelineError::SourceUnavailable {
            dataset,
            path: path.to_path_buf(),
            source,
        })?;

        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(PipelineError::EmptyWorkbook { dataset })??;

        // Worksheet row index of the header; lines are 1-based sheet rows.
        let first_row = range.start().map_or(0, |(row, _)| row as usize);
        let mut rows = range.rows().enumerate();
        let headers = rows
            .next()
            .map(|(_, row)| row.iter().map(|c| cell_text(c).trim().to_string()).collect())
            .unwrap_or_default();
        let rows = rows
            .filter(|(_, row)| row.iter().any(|c| !matches!(c, Data::Empty)))
            .map(|(i, row)| (first_row + i + 1, row.iter().map(cell_text).collect()))
            .collect();

        Ok(Self::with_lines(headers, rows))
    }

    /// Drops exact-duplicate rows, keeping the first occurrence. Returns the number dropped.
    pub fn drop_duplicates(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen = HashSet::with_capacity(before);
        self.rows.retain(|row| seen.insert(row.fields.clone()));
        before - self.rows.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn open_source(dataset: Dataset, path: &Path) -> Result<File> {
    File::open(path).map_err(|source| PipelineError::SourceUnavailable {
        dataset,
        path: path.to_path_buf(),
        source,
    })
}

/// Reads a whole text source such as a GeoJSON file.
pub fn read_source_text(dataset: Dataset, path: &Path) -> Result<String> {
    let mut text = String::new();
    open_source(dataset, path)?.read_to_string(&mut text)?;
    Ok(text)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        other => other.to_string(),
    }
}
