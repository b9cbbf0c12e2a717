//! Terminal progress display for package downloads.
//!
//! Thin wrapper around [`indicatif`] that renders [`DownloadProgress`] snapshots.
//! The bar switches between a byte-counting bar (content length known) and a
//! spinner (length unknown) as snapshots arrive. Set `SIDELOAD_NO_PROGRESS` or
//! pass `--no-progress` to hide it entirely.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

use crate::download::DownloadProgress;

/// Environment variable that disables all progress rendering.
pub const NO_PROGRESS_ENV: &str = "SIDELOAD_NO_PROGRESS";

/// Returns true when progress output has been disabled through the environment.
pub fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV).is_ok()
}

/// Progress bar for a single package download.
#[derive(Clone)]
pub struct DownloadBar {
    inner: IndicatifBar,
}

impl DownloadBar {
    /// Create a bar, hidden when `hidden` is set or progress is disabled globally.
    pub fn new(hidden: bool) -> Self {
        let inner = if hidden || is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self {
            inner,
        }
    }

    /// Render one progress snapshot.
    pub fn update(&self, progress: &DownloadProgress, progress_text: &str, eta_text: &str) {
        if let Some(total) = progress.total_bytes {
            if self.inner.length() != Some(total) {
                self.inner.set_length(total);
                self.inner.set_style(download_style());
            }
            self.inner.set_position(progress.downloaded_bytes.min(total));
        } else {
            self.inner.set_position(progress.downloaded_bytes);
        }
        self.inner.set_message(format!("{progress_text}  {eta_text}"));
    }

    /// Replace the message, used for retry countdowns.
    pub fn set_status(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn download_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
