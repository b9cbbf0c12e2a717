//! Global constants used throughout the update pipeline.
//!
//! This module contains timeout durations, retry parameters, size thresholds
//! and other fixed values shared by the resolver, downloader and orchestrator.
//! Defining them centrally keeps the heuristics discoverable and tunable.

use std::time::Duration;

/// File extension of an installable package, including the leading dot.
pub const PACKAGE_EXTENSION: &str = ".apk";

/// File name used for a downloaded package when the resolver has no usable suggestion.
pub const DEFAULT_PACKAGE_FILE_NAME: &str = "update.apk";

/// Maximum number of redirect hops followed while resolving a link.
pub const MAX_REDIRECTS: usize = 10;

/// Connect timeout applied to every HTTP request (15 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Read/write timeout applied to every HTTP request (30 seconds).
///
/// A connection that stalls longer than this is reported as a transient
/// network error and becomes eligible for the retry policy.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Smallest declared content length accepted for a package download (100 KiB).
///
/// Servers frequently answer a misfired link with a small HTML error page and a
/// 200 status. This is the default for `download.min_package_size`.
pub const MIN_PACKAGE_SIZE_BYTES: u64 = 100 * 1024;

/// Minimum wall-clock time between two progress snapshots (250ms).
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Number of retries granted to a download after transient network failures.
pub const MAX_DOWNLOAD_RETRIES: u32 = 20;

/// Delay counted down before every download retry (5 seconds).
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Pause between background re-checks in watch mode (3 minutes).
pub const CHECK_INTERVAL: Duration = Duration::from_secs(3 * 60);

/// Size of the buffered writer between the response stream and the destination file.
pub const DOWNLOAD_BUFFER_SIZE: usize = 8 * 1024;

/// User-Agent sent when scraping file-hosting pages.
///
/// Several hosts serve a bot-check page to anything that does not look like a
/// desktop browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// User-Agent sent for API calls and plain downloads.
pub const CLIENT_USER_AGENT: &str = concat!("sideload/", env!("CARGO_PKG_VERSION"));

/// Name of the install-state file kept next to the configuration file.
pub const INSTALL_STATE_FILE_NAME: &str = "install_state.json";
