//! The update job: check, resolve, download with retry, validate, record the
//! pending install and hand the package to the installer.
//!
//! ```text
//! Idle → Checking → LinkResolving → Downloading(retry n) → Validating → HandoffPending → Idle
//!            │            │                 │                   │
//!            └── failure or "no update" ────┴─── any failure ───┴──→ Idle
//! ```
//!
//! One job runs at a time. A check that arrives while another is in flight is
//! ignored. Starting a download cancels the download already running. The
//! byte stream runs on its own tokio task and reports progress and retry
//! status back over a channel, so the caller's task only drives the UI.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::install::{InstallPermission, PackageInstaller};
use super::verification::ChecksumVerifier;
use super::version_check::{ChangelogSource, CurrentVersion, UpdateDescriptor, VersionSource, check_for_update};
use crate::constants::{DEFAULT_PACKAGE_FILE_NAME, PACKAGE_EXTENSION};
use crate::core::UpdateError;
use crate::download::format::{format_progress, format_remaining};
use crate::download::{DownloadProgress, Downloader, RetryPolicy, RetryStatus};
use crate::package::{PackageInfo, PackageValidator};
use crate::resolver::{LinkResolver, ResolvedLink};
use crate::state::InstallStateStore;
use crate::utils::remove_file_if_exists;

/// Where the update job currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Checking,
    LinkResolving,
    /// `retry` is zero for the first attempt.
    Downloading {
        retry: u32,
    },
    Validating,
    HandoffPending,
    /// Paused until the install permission is granted.
    AwaitingPermission,
    /// Showing the post-install confirmation.
    Confirming,
}

/// How a call into the orchestrator ended.
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// Another check is in flight; this request was ignored.
    AlreadyRunning,
    UpToDate,
    /// The UI declined the offered release.
    Declined,
    /// Waiting for the install permission; resumes from [`UpdateOrchestrator::on_resume`].
    AwaitingPermission,
    /// The installer was launched for `package`.
    HandedOff {
        version_code: u32,
        package: PathBuf,
    },
    Cancelled,
    Failed(UpdateError),
}

/// Receives everything the user should see.
///
/// All methods have no-op defaults. `up_to_date` and `check_failed` are only
/// called for manual checks.
pub trait UpdateUi: Send + Sync {
    fn state_changed(&self, _state: &UpdateState) {}

    /// Offer `descriptor` to the user. Returning `false` ends the job.
    fn update_available(&self, _descriptor: &UpdateDescriptor) -> bool {
        true
    }

    fn up_to_date(&self, _current: &CurrentVersion) {}

    fn check_failed(&self, _error: &UpdateError) {}

    fn progress(&self, _progress: &DownloadProgress, _progress_text: &str, _eta_text: &str) {}

    fn retrying(&self, _status: &RetryStatus) {}

    fn permission_required(&self, _descriptor: &UpdateDescriptor) {}

    fn failed(&self, _error: &UpdateError) {}

    fn install_confirmed(&self, _version_name: Option<&str>) {}
}

/// External services the orchestrator depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub versions: Arc<dyn VersionSource>,
    pub changelogs: Option<Arc<dyn ChangelogSource>>,
    pub installer: Arc<dyn PackageInstaller>,
    pub permission: Arc<dyn InstallPermission>,
    pub ui: Arc<dyn UpdateUi>,
}

/// Per-process settings of the update job.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub current: CurrentVersion,
    pub locale: String,
    pub download_dir: PathBuf,
    pub retry: RetryPolicy,
    pub verify_checksum: bool,
}

enum WorkerEvent {
    Progress(DownloadProgress),
    Retry(RetryStatus),
}

/// Clears the check-in-flight flag when the check ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct UpdateOrchestrator {
    resolver: LinkResolver,
    downloader: Downloader,
    validator: PackageValidator,
    store: InstallStateStore,
    collaborators: Collaborators,
    settings: OrchestratorSettings,
    state: Mutex<UpdateState>,
    check_in_flight: AtomicBool,
    auto_checked: AtomicBool,
    job_counter: AtomicU64,
    job: Mutex<Option<(u64, CancellationToken)>>,
    awaiting_permission: Mutex<Option<UpdateDescriptor>>,
}

impl UpdateOrchestrator {
    pub fn new(
        resolver: LinkResolver,
        downloader: Downloader,
        store: InstallStateStore,
        collaborators: Collaborators,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            resolver,
            downloader,
            validator: PackageValidator::new(),
            store,
            collaborators,
            settings,
            state: Mutex::new(UpdateState::Idle),
            check_in_flight: AtomicBool::new(false),
            auto_checked: AtomicBool::new(false),
            job_counter: AtomicU64::new(0),
            job: Mutex::new(None),
            awaiting_permission: Mutex::new(None),
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state.lock().map(|s| s.clone()).unwrap_or(UpdateState::Idle)
    }

    pub fn store(&self) -> &InstallStateStore {
        &self.store
    }

    /// Run a check and, if the UI accepts the offered release, the whole job.
    ///
    /// `manual` checks report "up to date" and check failures to the UI;
    /// background checks stay silent.
    pub async fn check_now(&self, manual: bool) -> UpdateOutcome {
        if self.check_in_flight.swap(true, Ordering::AcqRel) {
            debug!("Update check already in flight, ignoring request");
            return UpdateOutcome::AlreadyRunning;
        }
        let _in_flight = InFlight(&self.check_in_flight);

        self.set_state(UpdateState::Checking);
        let c = &self.collaborators;
        let checked = check_for_update(
            c.versions.as_ref(),
            c.changelogs.as_deref(),
            &self.settings.current,
            &self.settings.locale,
        )
        .await;

        let descriptor = match checked {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                if manual {
                    c.ui.up_to_date(&self.settings.current);
                }
                self.set_state(UpdateState::Idle);
                return UpdateOutcome::UpToDate;
            }
            Err(e) => {
                warn!("Update check failed: {}", e);
                if manual {
                    c.ui.check_failed(&e);
                }
                self.set_state(UpdateState::Idle);
                return UpdateOutcome::Failed(e);
            }
        };

        if !c.ui.update_available(&descriptor) {
            info!("Update to {} declined", descriptor.version_name);
            self.set_state(UpdateState::Idle);
            return UpdateOutcome::Declined;
        }

        self.start_download(descriptor).await
    }

    /// Background check, at most once per orchestrator instance.
    ///
    /// Returns `None` when the automatic check already ran.
    pub async fn maybe_auto_check(&self) -> Option<UpdateOutcome> {
        if self.auto_checked.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(self.check_now(false).await)
    }

    /// Re-check in the background every `every` until `shutdown` fires.
    ///
    /// The first check runs immediately. Watching stops early, returning the
    /// outcome, once a package has been handed to the installer. Returns `None`
    /// when `shutdown` ends the watch; a job running at that moment is cancelled.
    pub async fn watch(&self, every: Duration, shutdown: &CancellationToken) -> Option<UpdateOutcome> {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return None,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                () = shutdown.cancelled() => {
                    self.cancel();
                    return None;
                }
                outcome = self.check_now(false) => outcome,
            };
            match outcome {
                UpdateOutcome::HandedOff {
                    ..
                } => return Some(outcome),
                other => debug!("Background check finished: {:?}, next in {:?}", other, every),
            }
        }
    }

    /// Continue a job that was paused for the install permission.
    ///
    /// Returns `None` when nothing is waiting or the permission is still missing.
    pub async fn on_resume(&self) -> Option<UpdateOutcome> {
        if !self.collaborators.permission.is_granted() {
            return None;
        }

        let descriptor = self.awaiting_permission.lock().ok().and_then(|mut pending| pending.take())?;
        info!("Install permission granted, resuming update to {}", descriptor.version_name);
        Some(self.start_download(descriptor).await)
    }

    /// Cancel the running download, if any, and return to idle.
    pub fn cancel(&self) {
        if let Some((id, token)) = self.job.lock().ok().and_then(|mut job| job.take()) {
            debug!("Cancelling update job {}", id);
            token.cancel();
        }
        if let Ok(mut pending) = self.awaiting_permission.lock() {
            pending.take();
        }
        self.set_state(UpdateState::Idle);
    }

    /// Resolve, download, validate and hand off `descriptor`.
    ///
    /// Cancels any download already running.
    pub async fn start_download(&self, descriptor: UpdateDescriptor) -> UpdateOutcome {
        let ui = &self.collaborators.ui;

        if !self.collaborators.permission.is_granted() {
            info!("Install permission missing, pausing update to {}", descriptor.version_name);
            self.collaborators.permission.request();
            ui.permission_required(&descriptor);
            if let Ok(mut pending) = self.awaiting_permission.lock() {
                *pending = Some(descriptor);
            }
            self.set_state(UpdateState::AwaitingPermission);
            return UpdateOutcome::AwaitingPermission;
        }

        let (job_id, token) = self.begin_job();
        let outcome = self.run_job(&descriptor, &token).await;
        let current = self.end_job(job_id);

        match &outcome {
            UpdateOutcome::Cancelled => debug!("Update job {} cancelled", job_id),
            UpdateOutcome::Failed(e) => {
                warn!("Update job {} failed: {}", job_id, e);
                ui.failed(e);
            }
            _ => {}
        }

        // A replacement job owns the state now
        if current {
            self.set_state(UpdateState::Idle);
        }
        outcome
    }

    async fn run_job(&self, descriptor: &UpdateDescriptor, token: &CancellationToken) -> UpdateOutcome {
        self.set_state(UpdateState::LinkResolving);
        let resolved = tokio::select! {
            biased;
            () = token.cancelled() => return UpdateOutcome::Cancelled,
            resolved = self.resolver.resolve(&descriptor.download_url) => resolved,
        };
        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(e) => return UpdateOutcome::Failed(e),
        };

        let dest = destination_for(&self.settings.download_dir, &resolved);
        info!("Downloading {} ({}) to {}", resolved.direct_url, resolved.link_type, dest.display());

        self.set_state(UpdateState::Downloading {
            retry: 0,
        });
        match self.download(&resolved.direct_url, &dest, token).await {
            Ok(bytes) => debug!("Download finished with {} bytes", bytes),
            Err(UpdateError::Cancelled) => return UpdateOutcome::Cancelled,
            Err(e) => return UpdateOutcome::Failed(e),
        }

        self.set_state(UpdateState::Validating);
        let info = match self.validate(&dest).await {
            Ok(info) => info,
            Err(e) => {
                discard(&dest);
                return UpdateOutcome::Failed(e);
            }
        };
        if let Some(code) = info.version_code.filter(|code| *code < descriptor.version_code) {
            warn!(
                "Package {} declares version code {} but {} was offered",
                info.package_name, code, descriptor.version_code
            );
        }

        if let Some(expected) = descriptor.sha256.as_deref().filter(|_| self.settings.verify_checksum) {
            if let Err(e) = ChecksumVerifier::verify_checksum(&dest, expected).await {
                discard(&dest);
                return UpdateOutcome::Failed(e);
            }
        }

        if token.is_cancelled() {
            return UpdateOutcome::Cancelled;
        }

        self.set_state(UpdateState::HandoffPending);
        if let Err(e) = self.store.mark_pending(descriptor.version_code, &descriptor.version_name, &dest) {
            return UpdateOutcome::Failed(e);
        }

        if let Err(e) = self.collaborators.installer.launch(&dest) {
            // Nothing was handed off, so nothing is pending
            if let Err(clear_err) = self.store.clear() {
                warn!("Failed to clear install state: {}", clear_err);
            }
            return UpdateOutcome::Failed(e);
        }

        info!("Handed off version {} to the installer", descriptor.version_code);
        UpdateOutcome::HandedOff {
            version_code: descriptor.version_code,
            package: dest,
        }
    }

    /// Retrying download on a worker task, forwarding its events to the UI.
    async fn download(&self, url: &str, dest: &Path, token: &CancellationToken) -> Result<u64, UpdateError> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let worker = {
            let downloader = self.downloader.clone();
            let policy = self.settings.retry;
            let url = url.to_string();
            let dest = dest.to_path_buf();
            let token = token.clone();
            let status_tx = tx.clone();

            tokio::spawn(async move {
                let cancel = token.clone();
                policy
                    .run(
                        &cancel,
                        |_| {
                            let downloader = downloader.clone();
                            let url = url.clone();
                            let dest = dest.clone();
                            let token = token.clone();
                            let tx = tx.clone();
                            async move {
                                downloader
                                    .download(&url, &dest, &token, move |p| {
                                        let _ = tx.send(WorkerEvent::Progress(p));
                                    })
                                    .await
                            }
                        },
                        |status| {
                            let _ = status_tx.send(WorkerEvent::Retry(status));
                        },
                    )
                    .await
            })
        };

        let ui = &self.collaborators.ui;
        while let Some(event) = rx.recv().await {
            if token.is_cancelled() {
                continue;
            }
            match event {
                WorkerEvent::Progress(p) => {
                    ui.progress(&p, &format_progress(&p), &format_remaining(p.eta_seconds));
                }
                WorkerEvent::Retry(status) => {
                    if let RetryStatus::Scheduled {
                        retry,
                        ..
                    } = &status
                    {
                        self.set_state(UpdateState::Downloading {
                            retry: *retry,
                        });
                    }
                    ui.retrying(&status);
                }
            }
        }

        worker.await.map_err(|e| UpdateError::Other {
            message: format!("download worker failed: {e}"),
        })?
    }

    async fn validate(&self, dest: &Path) -> Result<PackageInfo, UpdateError> {
        let validator = self.validator;
        let path = dest.to_path_buf();
        let info = tokio::task::spawn_blocking(move || validator.inspect(&path)).await.map_err(|e| {
            UpdateError::Other {
                message: format!("validation task failed: {e}"),
            }
        })??;
        info!("Validated package {} at {}", info.package_name, dest.display());
        Ok(info)
    }

    fn begin_job(&self) -> (u64, CancellationToken) {
        let id = self.job_counter.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancellationToken::new();
        if let Ok(mut job) = self.job.lock() {
            if let Some((previous, old)) = job.replace((id, token.clone())) {
                info!("Cancelling update job {} in favour of job {}", previous, id);
                old.cancel();
            }
        }
        (id, token)
    }

    /// Forget job `id`. Returns `false` when another job has replaced it.
    fn end_job(&self, id: u64) -> bool {
        let Ok(mut job) = self.job.lock() else {
            return false;
        };
        match job.as_ref() {
            Some((current, _)) if *current == id => {
                job.take();
                true
            }
            _ => false,
        }
    }

    fn set_state(&self, next: UpdateState) {
        if let Ok(mut state) = self.state.lock() {
            if *state != next {
                debug!("Update state {:?} -> {:?}", *state, next);
                state.clone_from(&next);
            }
        }
        self.collaborators.ui.state_changed(&next);
    }
}

/// `<dir>/<suggested name>` when the suggestion is a plain package file name,
/// otherwise `<dir>/update.apk`.
pub fn destination_for(dir: &Path, resolved: &ResolvedLink) -> PathBuf {
    let name = resolved
        .suggested_file_name
        .as_deref()
        .map(str::trim)
        .filter(|name| is_safe_file_name(name))
        .unwrap_or(DEFAULT_PACKAGE_FILE_NAME);
    dir.join(name)
}

fn is_safe_file_name(name: &str) -> bool {
    let has_extension = name.len() > PACKAGE_EXTENSION.len()
        && name.to_ascii_lowercase().ends_with(PACKAGE_EXTENSION);
    has_extension
        && !name.starts_with('.')
        && !name.chars().any(|c| matches!(c, '/' | '\\' | ':' | '\0') || c.is_control())
}

fn discard(path: &Path) {
    match remove_file_if_exists(path) {
        Ok(true) => debug!("Removed rejected package {}", path.display()),
        Ok(false) => {}
        Err(e) => warn!("Failed to remove rejected package: {:#}", e),
    }
}
