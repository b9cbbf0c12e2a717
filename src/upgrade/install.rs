//! Platform-installer and install-permission seams.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::InstallConfig;
use crate::core::UpdateError;

/// Hands a validated package to the platform installer.
///
/// Implementations start the installer and return; completion is detected on
/// the next start through the install-state record.
pub trait PackageInstaller: Send + Sync {
    fn launch(&self, package: &Path) -> Result<(), UpdateError>;
}

/// Whether this process may install packages from outside the store.
pub trait InstallPermission: Send + Sync {
    fn is_granted(&self) -> bool;

    /// Ask the platform to show its permission screen. The answer is read back
    /// through [`is_granted`](Self::is_granted) on the next resume.
    fn request(&self) {}
}

/// Permission source for platforms without an install-permission gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl InstallPermission for AlwaysGranted {
    fn is_granted(&self) -> bool {
        true
    }
}

/// Runs a configured command with the package path appended, e.g.
/// `adb install -r <package>`, without waiting for it to finish.
///
/// The child is reaped by a background task, so `launch` must run inside a
/// Tokio runtime.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
}

impl CommandInstaller {
    /// # Errors
    ///
    /// [`UpdateError::ConfigError`] when `command` is empty.
    pub fn new(command: &[String]) -> Result<Self, UpdateError> {
        let (program, args) = command.split_first().ok_or_else(|| UpdateError::ConfigError {
            message: "install command is empty".to_string(),
        })?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn from_config(config: &InstallConfig) -> Result<Self, UpdateError> {
        Self::new(&config.command)
    }
}

impl PackageInstaller for CommandInstaller {
    fn launch(&self, package: &Path) -> Result<(), UpdateError> {
        debug!("Launching installer: {} {:?} {}", self.program, self.args, package.display());
        let launch_error = |reason: String| UpdateError::InstallLaunchFailed {
            path: package.display().to_string(),
            reason,
        };

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| launch_error(format!("no async runtime to supervise the installer: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(package)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| launch_error(format!("cannot start '{}': {e}", self.program)))?;

        info!("Installer started (pid {:?}) for {}", child.id(), package.display());

        let program = self.program.clone();
        runtime.spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!("Installer '{}' exited", program),
                Ok(status) => warn!("Installer '{}' exited with {}", program, status),
                Err(e) => warn!("Failed to wait for installer '{}': {}", program, e),
            }
        });
        Ok(())
    }
}
