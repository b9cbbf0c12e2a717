//! Materializing a resolved link as a local file.
//!
//! - [`Downloader`] performs one streaming attempt with response guards
//! - [`RetryPolicy`] wraps attempts in a bounded, counted-down retry loop
//! - [`ProgressTracker`] turns chunk sizes into throttled [`DownloadProgress`] snapshots
//! - [`format`] renders sizes, speeds and remaining time for display
//!
//! # Example
//!
//! ```rust,no_run
//! use sideload::download::{Downloader, RetryPolicy};
//! use sideload::http::HttpClients;
//! use std::path::Path;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), sideload::core::UpdateError> {
//! let downloader = Downloader::new(HttpClients::new()?);
//! let cancel = CancellationToken::new();
//! let dest = Path::new("updates/app.apk");
//!
//! let bytes = RetryPolicy::default()
//!     .run(
//!         &cancel,
//!         |_| downloader.download("https://example.com/app.apk", dest, &cancel, |p| {
//!             println!("{}", sideload::download::format::format_progress(&p));
//!         }),
//!         |status| println!("{}", status.message()),
//!     )
//!     .await?;
//! println!("{bytes} bytes");
//! # Ok(())
//! # }
//! ```

mod downloader;
pub mod format;
mod progress;
mod retry;

pub use downloader::Downloader;
pub use progress::{DownloadProgress, ProgressTracker};
pub use retry::{RetryPolicy, RetryStatus};
