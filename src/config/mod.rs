//! Configuration for the updater.
//!
//! The configuration file is TOML and lives at `~/.sideload/config.toml` by
//! default. See [`UpdaterConfig`] for the full schema.

mod global;

pub use global::{
    AppConfig, CONFIG_PATH_ENV, DownloadConfig, InstallConfig, STATE_PATH_ENV, ServerConfig,
    UpdaterConfig,
};
