//! Auxiliary file fetching
//!
//! Files listed on an OS are validated, fetched if invalid, then validated
//! again. Validation is an existence check.

use crate::error::{BootEnvError, Result};
use async_trait::async_trait;
use provisioner_crd::FileData;
use provisioner_render::PathResolver;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::{debug, info, warn};

/// Downloads a URL to a destination path
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Fetch `url` into `dest`, returning the number of bytes written
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Streams downloads over HTTP
///
/// Data is written to `<dest>.part` and renamed into place once complete,
/// so an interrupted download never passes validation.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn download(&self, url: &str, part: &Path) -> Result<u64> {
        use futures::StreamExt;
        use tokio::io::AsyncWriteExt;

        let download_err = |reason: String| BootEnvError::Download {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(download_err(format!("HTTP error: {}", response.status())));
        }

        let content_length = response.content_length();
        info!(url = %url, content_length = ?content_length, "Download started");

        let mut file = fs::File::create(part)
            .await
            .map_err(|e| BootEnvError::io(part, e))?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_report = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| download_err(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| BootEnvError::io(part, e))?;
            downloaded += chunk.len() as u64;

            if last_report.elapsed() > Duration::from_secs(5) {
                let pct = content_length.map(|t| (downloaded * 100) / t.max(1)).unwrap_or(0);
                info!(url = %url, downloaded, percent = pct, "Download progress");
                last_report = Instant::now();
            }
        }

        file.sync_all().await.map_err(|e| BootEnvError::io(part, e))?;
        Ok(downloaded)
    }
}

#[async_trait]
impl FileFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let part = part_path(dest);

        match self.download(url, &part).await {
            Ok(bytes) => {
                fs::rename(&part, dest)
                    .await
                    .map_err(|e| BootEnvError::io(dest, e))?;
                info!(url = %url, bytes, dest = %dest.display(), "Download complete");
                Ok(bytes)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&part).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            path = %part.display(),
                            error = %rm,
                            "Failed to remove partial download"
                        );
                    }
                }
                Err(e)
            }
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Whether a file passes validation
pub async fn validate_file(path: &Path) -> bool {
    fs::metadata(path).await.is_ok()
}

/// Make sure one auxiliary file is present in the install tree
///
/// Returns `true` if the file had to be fetched. Files that already
/// validate are never downloaded again.
pub async fn ensure_file(
    fetcher: &dyn FileFetcher,
    resolver: &PathResolver,
    file: &FileData,
) -> Result<bool> {
    let dest = resolver.disk_path(&file.name);
    if validate_file(&dest).await {
        debug!(file = %file.name, path = %dest.display(), "File already present");
        return Ok(false);
    }

    info!(file = %file.name, url = %file.url, "Downloading file");
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| BootEnvError::io(parent, e))?;
    }

    fetcher.fetch(&file.url, &dest).await?;

    if !validate_file(&dest).await {
        return Err(BootEnvError::FileFetchFailed {
            name: file.name.clone(),
            path: dest,
        });
    }
    Ok(true)
}
