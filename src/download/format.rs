//! Human-readable rendering of sizes, speeds and remaining time.

use super::DownloadProgress;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// `512 B`, `1.50 KB`, `3.25 MB`, `1.00 GB`.
pub fn format_size(bytes: u64) -> String {
    let b = bytes as f64;
    if bytes < 1024 {
        format!("{bytes} B")
    } else if b < MIB {
        format!("{:.2} KB", b / KIB)
    } else if b < GIB {
        format!("{:.2} MB", b / MIB)
    } else {
        format!("{:.2} GB", b / GIB)
    }
}

/// `512.00 B/s`, `1.50 KB/s`, ...
pub fn format_speed(bytes_per_sec: f64) -> String {
    let bps = bytes_per_sec.max(0.0);
    if bps < KIB {
        format!("{bps:.2} B/s")
    } else if bps < MIB {
        format!("{:.2} KB/s", bps / KIB)
    } else if bps < GIB {
        format!("{:.2} MB/s", bps / MIB)
    } else {
        format!("{:.2} GB/s", bps / GIB)
    }
}

/// Remaining time with two-digit segments: `07s`, `03m 07s`, `01h 03m 07s`, `02d 01h 03m 07s`.
pub fn format_remaining(eta_seconds: Option<u64>) -> String {
    let Some(s) = eta_seconds else {
        return "calculating...".to_string();
    };

    if s < 60 {
        format!("{s:02}s left")
    } else if s < 3_600 {
        format!("{:02}m {:02}s left", s / 60, s % 60)
    } else if s < 86_400 {
        format!("{:02}h {:02}m {:02}s left", s / 3_600, (s % 3_600) / 60, s % 60)
    } else {
        format!(
            "{:02}d {:02}h {:02}m {:02}s left",
            s / 86_400,
            (s % 86_400) / 3_600,
            (s % 3_600) / 60,
            s % 60
        )
    }
}

/// Progress line for a snapshot, e.g. `1.50 MB / 3.00 MB (50.00%) - 512.00 KB/s`.
///
/// Speed is omitted from the final snapshot, where it is zero by definition.
pub fn format_progress(progress: &DownloadProgress) -> String {
    let mut line = match (progress.total_bytes, progress.percent()) {
        (Some(total), Some(percent)) => format!(
            "{} / {} ({:.2}%)",
            format_size(progress.downloaded_bytes),
            format_size(total),
            percent
        ),
        _ => format_size(progress.downloaded_bytes),
    };

    if progress.speed_bytes_per_sec > 0.0 {
        line.push_str(" - ");
        line.push_str(&format_speed(progress.speed_bytes_per_sec));
    }
    line
}
