//! Cross-platform utilities and helpers
//!
//! # Modules
//!
//! - [`fs`] - Directory creation, crash-safe atomic writes, best-effort removal
//! - [`progress`] - Terminal progress bars for the CLI
//!
//! # Example
//!
//! ```rust,no_run
//! use sideload::utils::{atomic_write, ensure_dir};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! ensure_dir(Path::new("updates"))?;
//! atomic_write(Path::new("updates/state.json"), b"{}")?;
//! # Ok(())
//! # }
//! ```

pub mod fs;
pub mod progress;

pub use fs::{atomic_write, ensure_dir, remove_file_if_exists};
pub use progress::{DownloadBar, is_progress_disabled};
