//! Updater configuration stored in `~/.sideload/config.toml`.
//!
//! Every field is optional in the file; missing sections fall back to their
//! defaults, so an empty file is a valid configuration.
//!
//! # Example
//!
//! ```toml
//! [app]
//! version_code = 150
//! version_name = "1.5.0"
//! locale = "en"
//!
//! [server]
//! check_endpoints = ["https://updates.example.com/api/update/check"]
//! changelog_endpoints = ["https://updates.example.com/api/changelog"]
//!
//! [download]
//! min_package_size = 102400
//! max_retries = 20
//! retry_delay_secs = 5
//! verify_checksum = true
//!
//! [install]
//! command = ["adb", "install", "-r"]
//! ```

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{
    CHECK_INTERVAL, INSTALL_STATE_FILE_NAME, MAX_DOWNLOAD_RETRIES, MIN_PACKAGE_SIZE_BYTES,
    RETRY_DELAY,
};
use crate::core::UpdateError;
use crate::resolver::ProviderHosts;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "SIDELOAD_CONFIG_PATH";

/// Environment variable overriding the install-state file location.
pub const STATE_PATH_ENV: &str = "SIDELOAD_STATE_PATH";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Identity of the currently running application.
    #[serde(default)]
    pub app: AppConfig,

    /// Version-check and changelog endpoints.
    #[serde(default)]
    pub server: ServerConfig,

    /// Download and validation tuning.
    #[serde(default)]
    pub download: DownloadConfig,

    /// Host lists used to classify update links.
    #[serde(default)]
    pub resolver: ProviderHosts,

    /// Platform installer invocation.
    #[serde(default)]
    pub install: InstallConfig,
}

/// The running application's version, as reported to the update server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Monotonic version code of the running build.
    #[serde(default)]
    pub version_code: u32,

    /// Human-readable version of the running build.
    #[serde(default = "default_version_name")]
    pub version_name: String,

    /// Locale passed to the version-check and changelog endpoints.
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version_code: 0,
            version_name: default_version_name(),
            locale: default_locale(),
        }
    }
}

/// Update server endpoints. Each list is tried in order until one answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub check_endpoints: Vec<String>,

    #[serde(default)]
    pub changelog_endpoints: Vec<String>,

    /// Seconds between background re-checks when watching for updates.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            check_endpoints: Vec::new(),
            changelog_endpoints: Vec::new(),
            check_interval_secs: default_check_interval_secs(),
        }
    }
}

impl ServerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Download, retry and validation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory packages are downloaded into. Defaults to `updates/` next to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Smallest declared content length accepted as a package.
    #[serde(default = "default_min_package_size")]
    pub min_package_size: u64,

    /// Retries granted after transient network failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds counted down before each retry.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Verify the SHA-256 digest when the update server publishes one.
    #[serde(default = "default_verify_checksum")]
    pub verify_checksum: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: None,
            min_package_size: default_min_package_size(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            verify_checksum: default_verify_checksum(),
        }
    }
}

impl DownloadConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Command used to hand a validated package to the platform installer.
///
/// The package path is appended as the final argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    #[serde(default = "default_install_command")]
    pub command: Vec<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            command: default_install_command(),
        }
    }
}

fn default_version_name() -> String {
    "0.0.0".to_string()
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_min_package_size() -> u64 {
    MIN_PACKAGE_SIZE_BYTES
}

fn default_max_retries() -> u32 {
    MAX_DOWNLOAD_RETRIES
}

fn default_retry_delay_secs() -> u64 {
    RETRY_DELAY.as_secs()
}

fn default_check_interval_secs() -> u64 {
    CHECK_INTERVAL.as_secs()
}

fn default_verify_checksum() -> bool {
    true
}

fn default_install_command() -> Vec<String> {
    vec!["adb".to_string(), "install".to_string(), "-r".to_string()]
}

impl UpdaterConfig {
    /// Load the configuration from `SIDELOAD_CONFIG_PATH` or the default location.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_with_optional(Some(path)).await
    }

    /// Load from `path` when given, otherwise from the default location.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load the configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (permissions, not found, etc.)
    /// - The file contains invalid TOML syntax
    /// - A configured endpoint is not a valid URL
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to `path`, creating parent directories as needed.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || crate::utils::atomic_write(&path, content.as_bytes()))
            .await
            .context("Config writer task failed")?
    }

    /// Check values that serde cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::ConfigError`] for unparseable endpoint URLs or an
    /// empty install command.
    pub fn validate(&self) -> Result<(), UpdateError> {
        for endpoint in self.server.check_endpoints.iter().chain(&self.server.changelog_endpoints) {
            Url::parse(endpoint).map_err(|e| UpdateError::ConfigError {
                message: format!("invalid endpoint '{endpoint}': {e}"),
            })?;
        }

        if self.install.command.is_empty() {
            return Err(UpdateError::ConfigError {
                message: "install.command must name a program".to_string(),
            });
        }

        if self.server.check_interval_secs == 0 {
            return Err(UpdateError::ConfigError {
                message: "server.check_interval_secs must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Default config file path.
    ///
    /// - `SIDELOAD_CONFIG_PATH` when set
    /// - **Windows**: `%LOCALAPPDATA%\sideload\config.toml`
    /// - **Unix/macOS**: `~/.sideload/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("sideload")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".sideload")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Where the install-state record lives.
    ///
    /// `SIDELOAD_STATE_PATH` when set, otherwise next to `config_path`.
    pub fn state_path(config_path: &Path) -> PathBuf {
        if let Ok(path) = std::env::var(STATE_PATH_ENV) {
            return PathBuf::from(path);
        }
        config_dir(config_path).join(INSTALL_STATE_FILE_NAME)
    }

    /// Directory packages are downloaded into.
    pub fn download_dir(&self, config_path: &Path) -> PathBuf {
        self.download.directory.clone().unwrap_or_else(|| config_dir(config_path).join("updates"))
    }
}

fn config_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
