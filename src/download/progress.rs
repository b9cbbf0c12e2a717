//! Download progress snapshots and the throttle that produces them.

use std::time::Duration;
use tokio::time::Instant;

use crate::constants::PROGRESS_INTERVAL;

/// One progress snapshot of a running download.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    /// Bytes written to the destination so far.
    pub downloaded_bytes: u64,
    /// Declared content length, `None` when the server omitted it.
    pub total_bytes: Option<u64>,
    /// Throughput over the last emission interval. `0.0` in the final snapshot.
    pub speed_bytes_per_sec: f64,
    /// Estimated seconds left, `None` while unknown.
    pub eta_seconds: Option<u64>,
}

impl DownloadProgress {
    /// Completed percentage in `0.0..=100.0`, when the total is known.
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(0) => Some(100.0),
            Some(total) => Some((self.downloaded_bytes as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

/// Turns a stream of chunk sizes into time-throttled [`DownloadProgress`] snapshots.
///
/// Speed is instantaneous: bytes since the previous emission divided by the time
/// since the previous emission. The caller passes the clock in, which keeps the
/// tracker deterministic under test.
#[derive(Debug)]
pub struct ProgressTracker {
    total: Option<u64>,
    interval: Duration,
    downloaded: u64,
    last_emit: Instant,
    last_emit_bytes: u64,
}

impl ProgressTracker {
    pub fn new(total: Option<u64>, started: Instant) -> Self {
        Self::with_interval(total, started, PROGRESS_INTERVAL)
    }

    pub fn with_interval(total: Option<u64>, started: Instant, interval: Duration) -> Self {
        Self {
            total,
            interval,
            downloaded: 0,
            last_emit: started,
            last_emit_bytes: 0,
        }
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }

    /// Account for `bytes` more bytes and return a snapshot if the interval has elapsed.
    pub fn record(&mut self, bytes: u64, now: Instant) -> Option<DownloadProgress> {
        self.downloaded += bytes;

        let elapsed = now.saturating_duration_since(self.last_emit);
        if elapsed < self.interval {
            return None;
        }

        let delta = self.downloaded - self.last_emit_bytes;
        let speed = delta as f64 / elapsed.as_secs_f64();
        self.last_emit = now;
        self.last_emit_bytes = self.downloaded;

        Some(DownloadProgress {
            downloaded_bytes: self.downloaded,
            total_bytes: self.total,
            speed_bytes_per_sec: speed,
            eta_seconds: self.eta(speed),
        })
    }

    /// The mandatory final snapshot: speed reset to zero, nothing left to wait for.
    pub fn finish(&self) -> DownloadProgress {
        DownloadProgress {
            downloaded_bytes: self.downloaded,
            total_bytes: self.total,
            speed_bytes_per_sec: 0.0,
            eta_seconds: Some(0),
        }
    }

    fn eta(&self, speed: f64) -> Option<u64> {
        let total = self.total?;
        if speed <= 1.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.downloaded);
        Some((remaining as f64 / speed).ceil() as u64)
    }
}
