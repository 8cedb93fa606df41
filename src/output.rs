//! Output formatting and persistence for cleaned tables, summaries and reports.
//!
//! Every file is written to a temporary sibling first and renamed into place,
//! so an interrupted run leaves the previous output intact.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use geojson::FeatureCollection;
use serde::Serialize;
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use tracing::{debug, info};

use crate::datasets::{Dataset, QuarantinedRow};
use crate::error::Result;

/// Prints a value to stdout as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Runs `write` against a temporary sibling of `path`, then renames it over `path`.
fn write_atomically(path: &Path, write: impl FnOnce(BufWriter<File>) -> Result<()>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    let result = File::create(&tmp)
        .map_err(Into::into)
        .and_then(|file| write(BufWriter::new(file)));
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Writes `rows` as CSV with a header row derived from the record type.
/// An empty table still gets its header.
pub fn write_table<T: Serialize + DeserializeOwned>(path: &Path, rows: &[T]) -> Result<()> {
    write_atomically(path, |file| {
        let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
        if rows.is_empty() {
            if let Some(columns) = field_names::<T>() {
                writer.write_record(columns)?;
            }
        }
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    })?;
    info!(path = %path.display(), rows = rows.len(), "Table written");
    Ok(())
}

/// Field names of a record struct, in declaration order, as its derived
/// `Deserialize` impl reports them. `None` for anything but a plain struct.
fn field_names<T: DeserializeOwned>() -> Option<&'static [&'static str]> {
    let mut captured = None;
    let _ = T::deserialize(FieldNames(&mut captured));
    captured
}

struct FieldNames<'a>(&'a mut Option<&'static [&'static str]>);

impl<'de> Deserializer<'de> for FieldNames<'_> {
    type Error = de::value::Error;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> std::result::Result<V::Value, Self::Error> {
        Err(de::Error::custom("not a struct"))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        *self.0 = Some(fields);
        Err(de::Error::custom("fields captured"))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}

/// Reads every row of a CSV file written by [`write_table`].
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    debug!(path = %path.display(), rows = rows.len(), "Table read");
    Ok(rows)
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_atomically(path, |mut file| {
        serde_json::to_writer_pretty(&mut file, value)?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(())
    })?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

pub fn write_feature_collection(path: &Path, collection: &FeatureCollection) -> Result<()> {
    write_json(path, collection)?;
    info!(path = %path.display(), features = collection.features.len(), "Feature collection written");
    Ok(())
}

/// Writes rejected rows to `<dir>/<dataset>.csv`. With no rejected rows any
/// file left by an earlier run is removed instead.
pub fn write_quarantine(dir: &Path, dataset: Dataset, rows: &[QuarantinedRow]) -> Result<Option<PathBuf>> {
    let path = dir.join(format!("{}.csv", dataset.name()));
    if rows.is_empty() {
        match fs::remove_file(&path) {
            Ok(()) => debug!(path = %path.display(), "Stale quarantine file removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        return Ok(None);
    }
    write_table(&path, rows)?;
    Ok(Some(path))
}
