//! The self-update job and its collaborators.
//!
//! # Components
//!
//! - [`UpdateOrchestrator`]: the state machine driving one update job
//! - [`HttpVersionSource`]: version check and changelog lookup over HTTP
//! - [`ChecksumVerifier`]: optional SHA-256 check against the published digest
//! - [`CommandInstaller`]: hands the package to a platform installer command
//! - [`PostInstallCheck`]: run at every start to confirm a handed-off install
//!
//! # Flow
//!
//! ```text
//! 1. Check
//!    ├── Ask the version source for the latest release
//!    └── Merge the changelog, if one is published
//!
//! 2. Resolve
//!    └── Turn the download link into a direct package URL
//!
//! 3. Download
//!    ├── Stream to <download dir>/<name>.apk on a worker task
//!    └── Retry transient network failures with a counted-down delay
//!
//! 4. Validate
//!    ├── Open the archive and read the manifest identity
//!    ├── Verify the SHA-256 when one is published
//!    └── Delete the file on any failure
//!
//! 5. Hand off
//!    ├── Record the pending install durably
//!    └── Launch the installer without waiting
//!
//! 6. Next start
//!    └── Confirm once the running version reaches the target, then clean up
//! ```

pub mod install;
pub mod orchestrator;
pub mod post_install;
pub mod verification;
pub mod version_check;

pub use install::{AlwaysGranted, CommandInstaller, InstallPermission, PackageInstaller};
pub use orchestrator::{
    Collaborators, OrchestratorSettings, UpdateOrchestrator, UpdateOutcome, UpdateState, UpdateUi,
    destination_for,
};
pub use post_install::{PostInstallCheck, PostInstallOutcome};
pub use verification::ChecksumVerifier;
pub use version_check::{
    ChangelogDetails, ChangelogSource, CurrentVersion, HttpVersionSource, UpdateDescriptor,
    VersionSource, check_for_update, format_release_date,
};
