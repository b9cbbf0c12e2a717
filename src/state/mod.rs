//! Durable record of an install handed off to the platform installer.
//!
//! The record bridges a process restart: it is written right before the
//! installer takes over and read on the next start to decide whether the
//! install went through. It is a flat JSON object with exactly four keys:
//!
//! ```json
//! {
//!   "is_pending": true,
//!   "target_version_code": 42,
//!   "target_version_name": "1.2.3",
//!   "apk_file_path": "/home/user/.sideload/updates/app.apk"
//! }
//! ```
//!
//! Writes go through [`atomic_write`], so a crash leaves either the previous
//! record or the new one on disk.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::UpdateError;
use crate::utils::atomic_write;

/// Pending-install record.
///
/// `is_pending == true` implies `target_version_code > 0` and a non-empty
/// `apk_file_path`. A cleared record has every field at its zero value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingInstallState {
    pub is_pending: bool,
    pub target_version_code: u32,
    pub target_version_name: String,
    pub apk_file_path: String,
}

impl PendingInstallState {
    /// Leftover package path, if one is recorded.
    pub fn apk_path(&self) -> Option<&Path> {
        if self.apk_file_path.is_empty() {
            None
        } else {
            Some(Path::new(&self.apk_file_path))
        }
    }

    fn is_consistent(&self) -> bool {
        !self.is_pending || (self.target_version_code > 0 && !self.apk_file_path.is_empty())
    }
}

/// File-backed [`PendingInstallState`] store.
///
/// Only one update job writes at a time, so the store does no locking of its own.
#[derive(Debug, Clone)]
pub struct InstallStateStore {
    path: PathBuf,
}

impl InstallStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record that `apk_path` is about to be installed as `version_code`.
    ///
    /// The record is on disk when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::StateStore`] when `version_code` is zero, the path is
    /// empty, or the record cannot be written.
    pub fn mark_pending(
        &self,
        version_code: u32,
        version_name: &str,
        apk_path: &Path,
    ) -> Result<(), UpdateError> {
        let state = PendingInstallState {
            is_pending: true,
            target_version_code: version_code,
            target_version_name: version_name.to_string(),
            apk_file_path: apk_path.to_string_lossy().into_owned(),
        };

        if !state.is_consistent() {
            return Err(self.error(format!(
                "refusing to record pending install with version code {version_code} and path '{}'",
                state.apk_file_path
            )));
        }

        self.write(&state)?;
        info!("Marked version {} ({}) as pending install", version_code, version_name);
        Ok(())
    }

    /// Current record. A missing, unreadable or inconsistent file reads as "nothing pending".
    pub fn query_pending(&self) -> PendingInstallState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return PendingInstallState::default();
            }
            Err(e) => {
                warn!("Cannot read install state {}: {}", self.path.display(), e);
                return PendingInstallState::default();
            }
        };

        match serde_json::from_str::<PendingInstallState>(&content) {
            Ok(state) if state.is_consistent() => state,
            Ok(state) => {
                warn!("Ignoring inconsistent install state {}: {:?}", self.path.display(), state);
                PendingInstallState::default()
            }
            Err(e) => {
                warn!("Ignoring corrupt install state {}: {}", self.path.display(), e);
                PendingInstallState::default()
            }
        }
    }

    /// `true` iff an install is pending and `current_version_code` has reached its target.
    pub fn is_satisfied_by(&self, current_version_code: u32) -> bool {
        let state = self.query_pending();
        state.is_pending && current_version_code >= state.target_version_code
    }

    /// Reset the record. Deleting the leftover package is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::StateStore`] when the record cannot be written.
    pub fn clear(&self) -> Result<(), UpdateError> {
        self.write(&PendingInstallState::default())?;
        debug!("Cleared install state {}", self.path.display());
        Ok(())
    }

    fn write(&self, state: &PendingInstallState) -> Result<(), UpdateError> {
        let json = serde_json::to_vec_pretty(state).map_err(|e| self.error(e.to_string()))?;
        atomic_write(&self.path, &json).map_err(|e| self.error(format!("{e:#}")))
    }

    fn error(&self, reason: String) -> UpdateError {
        UpdateError::StateStore {
            path: self.path.display().to_string(),
            reason,
        }
    }
}
