//! Uploads the processed outputs of the last pipeline run to S3.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

/// Every regular file under `dir`, recursively, in file-name order.
fn output_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        if entry.file_type().is_file() && !entry.path().extension().is_some_and(|ext| ext == "tmp") {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// `date=<YYYY-MM-DD>/<relative path>`, with a `.gz` suffix for compressed bodies.
fn object_key(date: NaiveDate, relative: &Path, gzip: bool) -> String {
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let key = format!("date={}/{}", date.format("%Y-%m-%d"), relative);
    if gzip { format!("{key}.gz") } else { key }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("csv") => "text/csv",
        Some("geojson") => "application/geo+json",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

fn encode_body(contents: Vec<u8>, gzip: bool) -> Result<Vec<u8>> {
    if !gzip {
        return Ok(contents);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&contents)?;
    Ok(encoder.finish()?)
}

/// Uploads every file under `processed_dir`, keyed by run date. Returns the
/// number of objects written.
#[instrument(skip(client), fields(processed_dir = %processed_dir.display()))]
pub async fn publish_outputs(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    processed_dir: &Path,
    date: NaiveDate,
    gzip: bool,
) -> Result<usize> {
    let files = output_files(processed_dir)?;
    if files.is_empty() {
        anyhow::bail!("no processed outputs under {}, run `process` first", processed_dir.display());
    }

    let mut upload_count = 0;
    for path in files {
        let relative = path.strip_prefix(processed_dir).unwrap_or(&path);
        let key = object_key(date, relative, gzip);
        let contents = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let body = encode_body(contents, gzip)?;
        debug!(key = %key, bytes = body.len(), "Uploading output");

        client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .content_type(content_type(&path))
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("uploading s3://{bucket}/{key}"))?;
        upload_count += 1;
    }

    info!(upload_count, date = %date, "S3 upload complete");
    Ok(upload_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_object_key_uses_forward_slashes() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        let relative = Path::new("quarantine").join("crime_incidents.csv");
        assert_eq!(object_key(date, &relative, false), "date=2025-03-09/quarantine/crime_incidents.csv");
        assert_eq!(
            object_key(date, Path::new("neighborhood_summary.csv"), true),
            "date=2025-03-09/neighborhood_summary.csv.gz"
        );
    }

    #[test]
    fn test_gzip_body_decodes_to_original() {
        let body = encode_body(b"neighborhood,total_properties\n".to_vec(), true).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(body.as_slice()).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "neighborhood,total_properties\n");
    }

    #[test]
    fn test_output_files_recurse_and_skip_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("quarantine")).unwrap();
        std::fs::write(dir.path().join("run_report.json"), "{}").unwrap();
        std::fs::write(dir.path().join("schools_clean.csv.tmp"), "").unwrap();
        std::fs::write(dir.path().join("quarantine").join("schools.csv"), "").unwrap();

        let files = output_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("quarantine").join("schools.csv"),
                dir.path().join("run_report.json"),
            ]
        );
        assert_eq!(content_type(&files[1]), "application/json");
    }
}
