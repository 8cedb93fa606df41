//! Downloading the raw extracts.

mod basic;

pub use basic::BasicClient;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Request, Response};
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;

/// Delay before the second attempt; doubled for each further attempt.
const BASE_RETRY_DELAY: Duration = Duration::from_secs(2);

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// GETs `url` and returns the body. Non-success statuses are errors.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes> {
    let req = Request::new(reqwest::Method::GET, url.parse()?);
    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?)
}

/// Runs `op` up to `attempts` times, sleeping `base_delay * 2^n` between tries.
pub async fn with_retries<T, F, Fut>(attempts: u32, base_delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                let delay = base_delay * 2u32.pow(attempt - 1);
                warn!(attempt, attempts, ?delay, error = %e, "Attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e.context(format!("giving up after {attempts} attempt(s)"))),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Downloads every configured source URL into the raw directory.
///
/// Existing files are kept unless `force` is set. A failed source is logged
/// and recorded; the remaining sources are still attempted.
#[instrument(skip_all, fields(raw_dir = %config.raw_dir.display(), force = force))]
pub async fn download_sources<C: HttpClient>(client: &C, config: &PipelineConfig, force: bool) -> Result<DownloadSummary> {
    tokio::fs::create_dir_all(&config.raw_dir)
        .await
        .with_context(|| format!("creating {}", config.raw_dir.display()))?;

    let mut summary = DownloadSummary::default();
    for (file_name, url) in &config.source_urls {
        let target = config.raw_dir.join(file_name);
        if !force && tokio::fs::try_exists(&target).await.unwrap_or(false) {
            info!(path = %target.display(), "Already downloaded, skipping");
            summary.skipped.push(target);
            continue;
        }

        let result = with_retries(config.download_attempts, BASE_RETRY_DELAY, |attempt| {
            info!(url, attempt, "Downloading source");
            fetch_bytes(client, url)
        })
        .await;

        match result {
            Ok(bytes) => {
                write_download(&target, &bytes).await?;
                info!(path = %target.display(), bytes = bytes.len(), "Source downloaded");
                summary.downloaded.push(target);
            }
            Err(e) => {
                warn!(url, error = %e, "Source download failed");
                summary.failed.push((target, format!("{e:#}")));
            }
        }
    }
    Ok(summary)
}

async fn write_download(target: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = target.as_os_str().to_os_string();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, target).await?;
    Ok(())
}
