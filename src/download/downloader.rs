//! Streaming package download with response guards and throttled progress.

use reqwest::header::CONTENT_TYPE;
use std::path::Path;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::progress::{DownloadProgress, ProgressTracker};
use crate::constants::{DOWNLOAD_BUFFER_SIZE, MIN_PACKAGE_SIZE_BYTES, PROGRESS_INTERVAL};
use crate::core::UpdateError;
use crate::http::{HttpClients, map_reqwest_error, parse_url};

/// Content types that mean "you got a web page, not a package".
const REJECTED_CONTENT_TYPES: &[&str] = &["text/html", "text/plain"];

/// Streams a resolved package URL to disk.
///
/// One call is one attempt. Retrying is the job of [`RetryPolicy`](super::RetryPolicy);
/// every attempt recreates the destination file from scratch.
#[derive(Debug, Clone)]
pub struct Downloader {
    clients: HttpClients,
    min_package_size: u64,
    progress_interval: Duration,
}

impl Downloader {
    pub fn new(clients: HttpClients) -> Self {
        Self {
            clients,
            min_package_size: MIN_PACKAGE_SIZE_BYTES,
            progress_interval: PROGRESS_INTERVAL,
        }
    }

    /// Override the smallest declared content length accepted as a package.
    #[must_use]
    pub fn with_min_package_size(mut self, bytes: u64) -> Self {
        self.min_package_size = bytes;
        self
    }

    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Download `url` into `dest`, reporting progress through `on_progress`.
    ///
    /// The response is checked before the destination is touched: a non-success
    /// status, a text content type or a declared length below the minimum package
    /// size all fail without writing a byte. The body is then streamed through a
    /// buffered writer. Snapshots are emitted at most once per progress interval,
    /// followed by one final snapshot with zero speed.
    ///
    /// Cancellation is checked between reads. A cancelled or failed attempt leaves
    /// the partial file in place for the next attempt to truncate.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::HttpStatus`] for a non-success status
    /// - [`UpdateError::ContentInvalid`] for a rejected content type or length
    /// - [`UpdateError::NetworkTransient`] for transport failures and short bodies
    /// - [`UpdateError::IoError`] for local write failures
    /// - [`UpdateError::Cancelled`] when `cancel` fires
    pub async fn download<F>(
        &self,
        url: &str,
        dest: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<u64, UpdateError>
    where
        F: FnMut(DownloadProgress),
    {
        let request = self.clients.following().get(parse_url(url)?).send();
        let mut response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(UpdateError::Cancelled),
            response = request => response.map_err(|e| map_reqwest_error("download", e))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus {
                url: response.url().to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default().to_ascii_lowercase();
            if REJECTED_CONTENT_TYPES.iter().any(|t| content_type.starts_with(t)) {
                return Err(UpdateError::content(format!(
                    "server returned '{content_type}' instead of a package"
                )));
            }
        }

        let total = response.content_length();
        if let Some(len) = total.filter(|len| *len < self.min_package_size) {
            return Err(UpdateError::content(format!(
                "declared size {len} bytes is below the {} byte minimum",
                self.min_package_size
            )));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let file = File::create(dest).await?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFFER_SIZE, file);

        debug!("Streaming {} ({:?} bytes) to {}", url, total, dest.display());
        let mut tracker = ProgressTracker::with_interval(total, Instant::now(), self.progress_interval);

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Download of {} cancelled after {} bytes", url, tracker.downloaded());
                    return Err(UpdateError::Cancelled);
                }
                chunk = response.chunk() => chunk.map_err(|e| map_reqwest_error("download", e))?,
            };

            let Some(bytes) = chunk else {
                break;
            };

            writer.write_all(&bytes).await?;
            if let Some(snapshot) = tracker.record(bytes.len() as u64, Instant::now()) {
                on_progress(snapshot);
            }
        }

        writer.flush().await?;
        writer.get_ref().sync_all().await?;

        let downloaded = tracker.downloaded();
        if let Some(total) = total.filter(|total| downloaded < *total) {
            return Err(UpdateError::network(
                "download",
                format!("connection closed after {downloaded} of {total} bytes"),
            ));
        }

        on_progress(tracker.finish());
        info!("Downloaded {} bytes to {}", downloaded, dest.display());
        Ok(downloaded)
    }
}
