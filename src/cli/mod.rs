//! Command-line interface for sideload.
//!
//! Every command loads the configuration once, builds the library pieces it
//! needs from it and drives them to completion. Failures are returned as
//! [`anyhow::Error`] and rendered by the binary through
//! [`user_friendly_error`](crate::core::user_friendly_error).
//!
//! # Available Commands
//!
//! - `check` - Ask the update server for a newer release
//! - `upgrade` - Run the full update job: check, resolve, download, validate, install
//! - `resolve` - Turn a download link into a direct package URL
//! - `download` - Resolve, download with retry and validate a package
//! - `validate` - Check that a local file is an installable package
//! - `status` - Show the pending-install record
//! - `confirm` - App-start hook confirming a handed-off install
//!
//! # Examples
//!
//! ```bash
//! sideload check
//! sideload upgrade --yes
//! sideload --no-progress download https://example.com/app.apk --output app.apk
//! sideload --config ./sideload.toml confirm --current-version-code 200
//! ```

mod check;
mod confirm;
mod console;
mod download;
mod resolve;
mod status;
mod upgrade;
mod validate;

pub use console::ConsoleUi;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::UpdaterConfig;
use crate::download::{Downloader, RetryPolicy};
use crate::http::HttpClients;
use crate::resolver::LinkResolver;
use crate::state::InstallStateStore;
use crate::upgrade::CurrentVersion;

/// Self-update pipeline for sideloaded Android packages.
#[derive(Parser, Debug)]
#[command(
    name = "sideload",
    about = "Resolve, download, validate and install application updates",
    version,
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Disable logging; only results and errors are printed.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file (default: ~/.sideload/config.toml).
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable progress bars and spinners.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the update server whether a newer release exists.
    Check(check::CheckCommand),

    /// Check for an update and install it.
    Upgrade(upgrade::UpgradeCommand),

    /// Resolve a download link to a direct package URL.
    Resolve(resolve::ResolveCommand),

    /// Download and validate a package from any supported link.
    Download(download::DownloadCommand),

    /// Validate a local package file.
    Validate(validate::ValidateCommand),

    /// Show the pending-install record.
    Status(status::StatusCommand),

    /// Confirm a previously launched install, if the running version reached it.
    Confirm(confirm::ConfirmCommand),
}

/// Everything a command needs, resolved once from the global flags.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub config: UpdaterConfig,
    pub config_path: PathBuf,
    pub no_progress: bool,
    pub quiet: bool,
}

impl CommandContext {
    pub fn clients(&self) -> Result<HttpClients> {
        Ok(HttpClients::new()?)
    }

    pub fn resolver(&self, clients: &HttpClients) -> LinkResolver {
        LinkResolver::new(clients.clone(), self.config.resolver.clone())
    }

    pub fn downloader(&self, clients: &HttpClients) -> Downloader {
        Downloader::new(clients.clone()).with_min_package_size(self.config.download.min_package_size)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.download.max_retries, self.config.download.retry_delay())
    }

    pub fn store(&self) -> InstallStateStore {
        InstallStateStore::new(UpdaterConfig::state_path(&self.config_path))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.config.download_dir(&self.config_path)
    }

    pub fn current_version(&self) -> CurrentVersion {
        CurrentVersion::new(self.config.app.version_code, self.config.app.version_name.clone())
    }
}

impl Cli {
    /// Initialize logging, load the configuration and run the selected command.
    pub async fn execute(self) -> Result<()> {
        init_logging(self.verbose, self.quiet);

        let config_path = match self.config {
            Some(path) => path,
            None => UpdaterConfig::default_path()?,
        };
        let config = UpdaterConfig::load_with_optional(Some(config_path.clone())).await?;

        let ctx = CommandContext {
            config,
            config_path,
            no_progress: self.no_progress,
            quiet: self.quiet,
        };

        match self.command {
            Commands::Check(cmd) => cmd.execute(&ctx).await,
            Commands::Upgrade(cmd) => cmd.execute(&ctx).await,
            Commands::Resolve(cmd) => cmd.execute(&ctx).await,
            Commands::Download(cmd) => cmd.execute(&ctx).await,
            Commands::Validate(cmd) => cmd.execute(&ctx).await,
            Commands::Status(cmd) => cmd.execute(&ctx),
            Commands::Confirm(cmd) => cmd.execute(&ctx),
        }
    }
}

/// Install the stderr log subscriber.
///
/// `RUST_LOG` wins. Otherwise `--verbose` logs debug, the default logs this
/// crate at info and dependencies at warn, and `--quiet` logs nothing.
fn init_logging(verbose: bool, quiet: bool) {
    let filter = if let Ok(directives) = std::env::var("RUST_LOG") {
        EnvFilter::new(directives)
    } else if quiet {
        return;
    } else if verbose {
        EnvFilter::new("info,sideload=debug")
    } else {
        EnvFilter::new("warn,sideload=info")
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
