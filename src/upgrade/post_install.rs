//! App-start check for an install handed off by a previous process.

use tracing::{debug, info, warn};

use super::orchestrator::{UpdateState, UpdateUi};
use crate::core::UpdateError;
use crate::state::InstallStateStore;
use crate::utils::remove_file_if_exists;

/// Result of [`PostInstallCheck::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostInstallOutcome {
    /// No install was handed off.
    NotPending,
    /// An install is recorded but the running version has not reached it yet.
    /// The record is kept for the next start.
    StillPending {
        target_version_code: u32,
    },
    /// The install went through. The record and leftover package are gone.
    Confirmed {
        version_name: Option<String>,
    },
}

/// Stateless check run on every start, not only after an update.
pub struct PostInstallCheck;

impl PostInstallCheck {
    /// Compare the running version against the pending record.
    ///
    /// On success the UI shows its one-time confirmation, then the leftover
    /// package is deleted and the record cleared.
    ///
    /// # Errors
    ///
    /// [`UpdateError::StateStore`] when the cleared record cannot be written.
    pub fn run(
        store: &InstallStateStore,
        current_version_code: u32,
        ui: &dyn UpdateUi,
    ) -> Result<PostInstallOutcome, UpdateError> {
        let pending = store.query_pending();
        if !pending.is_pending {
            return Ok(PostInstallOutcome::NotPending);
        }

        if current_version_code < pending.target_version_code {
            debug!(
                "Install of {} not finished yet (running {})",
                pending.target_version_code, current_version_code
            );
            return Ok(PostInstallOutcome::StillPending {
                target_version_code: pending.target_version_code,
            });
        }

        let version_name =
            Some(pending.target_version_name.trim().to_string()).filter(|name| !name.is_empty());

        ui.state_changed(&UpdateState::Confirming);
        ui.install_confirmed(version_name.as_deref());

        if let Some(path) = pending.apk_path() {
            match remove_file_if_exists(path) {
                Ok(true) => debug!("Removed installed package {}", path.display()),
                Ok(false) => {}
                Err(e) => warn!("Failed to remove installed package: {:#}", e),
            }
        }
        store.clear()?;
        ui.state_changed(&UpdateState::Idle);

        info!("Confirmed install of version {}", pending.target_version_code);
        Ok(PostInstallOutcome::Confirmed {
            version_name,
        })
    }
}
