//! PDF download from the URL column of a results file.
//!
//! Downloads run one at a time. A failed URL is reported and skipped; no
//! retry and no content-type check happen here (see [`crate::verify`]).

use crate::error::{Result, ScholarError};
use crate::gscholar::build_http_client;
use crate::parser::NOT_AVAILABLE;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

/// Name used when a URL has no final path segment.
pub const DEFAULT_FILENAME: &str = "downloaded_file.pdf";

/// Characters that may not appear in a saved filename.
const ILLEGAL_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Derive a local filename from a URL's final path segment.
///
/// The result never contains any of `<>:"/\|?*` and always ends with `.pdf`.
pub fn filename_from_url(url: &str) -> String {
    let segment = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string(),
        Err(_) => url.rsplit('/').next().unwrap_or_default().to_string(),
    };

    let segment = if segment.is_empty() {
        DEFAULT_FILENAME.to_string()
    } else {
        segment
    };

    let mut name: String = segment
        .chars()
        .filter(|c| !ILLEGAL_FILENAME_CHARS.contains(c))
        .collect();

    if !name.ends_with(".pdf") {
        name.push_str(".pdf");
    }
    name
}

/// Outcome of a download run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub downloaded: Vec<PathBuf>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Sequential PDF downloader.
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(proxy: Option<&str>) -> Result<Self> {
        Ok(Self {
            client: build_http_client(proxy)?,
        })
    }

    /// Download every URL into `out_dir`, continuing past failures.
    pub async fn download_all(&self, urls: &[String], out_dir: &Path) -> Result<DownloadSummary> {
        tokio::fs::create_dir_all(out_dir).await?;
        info!(count = urls.len(), dir = %out_dir.display(), "Starting downloads");

        let mut summary = DownloadSummary::default();

        for url in urls {
            let url = url.trim();
            if !is_downloadable(url) {
                warn!(url, "Skipping entry without a usable URL");
                summary.skipped.push(url.to_string());
                continue;
            }

            let path = out_dir.join(filename_from_url(url));
            match self.download_one(url, &path).await {
                Ok(bytes) => {
                    println!("Successfully downloaded {}", path.display());
                    info!(url, bytes, path = %path.display(), "Downloaded");
                    summary.downloaded.push(path);
                }
                Err(e) => {
                    println!("Error downloading {}: {}", url, e);
                    warn!(url, error = %e, "Download failed");
                    summary.failed.push(url.to_string());
                }
            }
        }

        info!(
            downloaded = summary.downloaded.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "Downloads complete"
        );
        Ok(summary)
    }

    async fn download_one(&self, url: &str, path: &Path) -> Result<usize> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScholarError::Api {
                code: status.as_u16() as i32,
                message: format!("HTTP error: {}", status),
            });
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(path, &bytes).await?;
        Ok(bytes.len())
    }
}

fn is_downloadable(url: &str) -> bool {
    if url.is_empty() || url == NOT_AVAILABLE {
        return false;
    }
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}
