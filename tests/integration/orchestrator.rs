use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use sideload::core::UpdateError;
use sideload::download::{DownloadProgress, Downloader, RetryPolicy, RetryStatus};
use sideload::http::HttpClients;
use sideload::resolver::{LinkResolver, ProviderHosts};
use sideload::state::InstallStateStore;
use sideload::test_utils::{ManifestSpec, MockResponse, MockServer, package_bytes};
use sideload::upgrade::{
    Collaborators, CurrentVersion, InstallPermission, OrchestratorSettings, PackageInstaller,
    UpdateDescriptor, UpdateOrchestrator, UpdateOutcome, UpdateState, UpdateUi, VersionSource,
};

const CURRENT_CODE: u32 = 150;
const OFFERED_CODE: u32 = 200;

/// Version source answering with a fixed descriptor after an optional delay.
struct FixedVersions {
    descriptor: Option<UpdateDescriptor>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FixedVersions {
    fn offering(descriptor: UpdateDescriptor) -> Self {
        Self {
            descriptor: Some(descriptor),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn none() -> Self {
        Self {
            descriptor: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl VersionSource for FixedVersions {
    async fn check(&self, current: &CurrentVersion, _locale: &str) -> Result<Option<UpdateDescriptor>, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.descriptor.clone().filter(|d| d.is_newer_than(current)))
    }
}

struct FailingVersions;

#[async_trait]
impl VersionSource for FailingVersions {
    async fn check(&self, _current: &CurrentVersion, _locale: &str) -> Result<Option<UpdateDescriptor>, UpdateError> {
        Err(UpdateError::CheckFailed {
            reason: "server unreachable".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingInstaller {
    launched: Mutex<Vec<PathBuf>>,
    fail: bool,
}

impl RecordingInstaller {
    fn failing() -> Self {
        Self {
            launched: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn launched(&self) -> Vec<PathBuf> {
        self.launched.lock().unwrap().clone()
    }
}

impl PackageInstaller for RecordingInstaller {
    fn launch(&self, package: &Path) -> Result<(), UpdateError> {
        self.launched.lock().unwrap().push(package.to_path_buf());
        if self.fail {
            return Err(UpdateError::InstallLaunchFailed {
                path: package.display().to_string(),
                reason: "installer not found".to_string(),
            });
        }
        Ok(())
    }
}

struct TogglePermission {
    granted: AtomicBool,
    requests: AtomicUsize,
}

impl TogglePermission {
    fn new(granted: bool) -> Self {
        Self {
            granted: AtomicBool::new(granted),
            requests: AtomicUsize::new(0),
        }
    }

    fn grant(&self) {
        self.granted.store(true, Ordering::SeqCst);
    }
}

impl InstallPermission for TogglePermission {
    fn is_granted(&self) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingUi {
    states: Mutex<Vec<UpdateState>>,
    progress: Mutex<Vec<DownloadProgress>>,
    retries: Mutex<Vec<RetryStatus>>,
    failures: Mutex<Vec<String>>,
    up_to_date: AtomicUsize,
    permission_prompts: AtomicUsize,
    decline: bool,
}

impl RecordingUi {
    fn declining() -> Self {
        Self {
            decline: true,
            ..Self::default()
        }
    }

    fn states(&self) -> Vec<UpdateState> {
        let mut states = self.states.lock().unwrap().clone();
        states.dedup();
        states
    }
}

impl UpdateUi for RecordingUi {
    fn state_changed(&self, state: &UpdateState) {
        self.states.lock().unwrap().push(state.clone());
    }

    fn update_available(&self, _descriptor: &UpdateDescriptor) -> bool {
        !self.decline
    }

    fn up_to_date(&self, _current: &CurrentVersion) {
        self.up_to_date.fetch_add(1, Ordering::SeqCst);
    }

    fn progress(&self, progress: &DownloadProgress, _progress_text: &str, _eta_text: &str) {
        self.progress.lock().unwrap().push(*progress);
    }

    fn retrying(&self, status: &RetryStatus) {
        self.retries.lock().unwrap().push(status.clone());
    }

    fn permission_required(&self, _descriptor: &UpdateDescriptor) {
        self.permission_prompts.fetch_add(1, Ordering::SeqCst);
    }

    fn failed(&self, error: &UpdateError) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

fn descriptor(version_code: u32, download_url: String) -> UpdateDescriptor {
    UpdateDescriptor {
        version_code,
        version_name: format!("{}.0.0", version_code / 100),
        download_url,
        release_date_raw: None,
        release_date: None,
        changelog: "Bug fixes".to_string(),
        mandatory: false,
        sha256: None,
    }
}

fn package(version_code: u32) -> Vec<u8> {
    package_bytes(&ManifestSpec::new("com.example.app", version_code, "2.0.0")).unwrap()
}

struct Harness {
    temp: TempDir,
    orchestrator: UpdateOrchestrator,
    installer: Arc<RecordingInstaller>,
    permission: Arc<TogglePermission>,
    ui: Arc<RecordingUi>,
}

impl Harness {
    fn download_dir(&self) -> PathBuf {
        self.temp.path().join("updates")
    }
}

struct HarnessBuilder {
    versions: Arc<dyn VersionSource>,
    installer: RecordingInstaller,
    permission: bool,
    ui: RecordingUi,
    retry: RetryPolicy,
}

impl HarnessBuilder {
    fn new(versions: impl VersionSource + 'static) -> Self {
        Self {
            versions: Arc::new(versions),
            installer: RecordingInstaller::default(),
            permission: true,
            ui: RecordingUi::default(),
            retry: RetryPolicy::new(2, Duration::from_millis(10)),
        }
    }

    fn installer(mut self, installer: RecordingInstaller) -> Self {
        self.installer = installer;
        self
    }

    fn permission(mut self, granted: bool) -> Self {
        self.permission = granted;
        self
    }

    fn ui(mut self, ui: RecordingUi) -> Self {
        self.ui = ui;
        self
    }

    fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build(self) -> Harness {
        let temp = TempDir::new().unwrap();
        let clients = HttpClients::new().unwrap();
        let installer = Arc::new(self.installer);
        let permission = Arc::new(TogglePermission::new(self.permission));
        let ui = Arc::new(self.ui);

        let orchestrator = UpdateOrchestrator::new(
            LinkResolver::new(clients.clone(), ProviderHosts::default()),
            Downloader::new(clients).with_progress_interval(Duration::from_millis(5)),
            InstallStateStore::new(temp.path().join("install_state.json")),
            Collaborators {
                versions: self.versions,
                changelogs: None,
                installer: installer.clone(),
                permission: permission.clone(),
                ui: ui.clone(),
            },
            OrchestratorSettings {
                current: CurrentVersion::new(CURRENT_CODE, "1.5.0"),
                locale: "en".to_string(),
                download_dir: temp.path().join("updates"),
                retry: self.retry,
                verify_checksum: true,
            },
        );

        Harness {
            temp,
            orchestrator,
            installer,
            permission,
            ui,
        }
    }
}

#[tokio::test]
async fn test_update_job_hands_off_valid_package() {
    let server = MockServer::start().await.unwrap();
    server.route("/releases/app-2.0.apk", MockResponse::ok(package(OFFERED_CODE)));
    let offered = descriptor(OFFERED_CODE, server.url("/releases/app-2.0.apk"));
    let h = HarnessBuilder::new(FixedVersions::offering(offered)).build();

    let outcome = h.orchestrator.check_now(true).await;

    let expected = h.download_dir().join("app-2.0.apk");
    match outcome {
        UpdateOutcome::HandedOff {
            version_code,
            package,
        } => {
            assert_eq!(version_code, OFFERED_CODE);
            assert_eq!(package, expected);
        }
        other => panic!("expected HandedOff, got {other:?}"),
    }
    assert_eq!(h.installer.launched(), vec![expected.clone()]);
    assert!(expected.exists(), "package stays until the install is confirmed");

    let pending = h.orchestrator.store().query_pending();
    assert!(pending.is_pending);
    assert_eq!(pending.target_version_code, OFFERED_CODE);
    assert_eq!(pending.target_version_name, "2.0.0");
    assert_eq!(pending.apk_path(), Some(expected.as_path()));

    assert_eq!(
        h.ui.states(),
        vec![
            UpdateState::Checking,
            UpdateState::LinkResolving,
            UpdateState::Downloading {
                retry: 0
            },
            UpdateState::Validating,
            UpdateState::HandoffPending,
            UpdateState::Idle,
        ]
    );
    assert_eq!(h.orchestrator.state(), UpdateState::Idle);

    let progress = h.ui.progress.lock().unwrap().clone();
    let last = progress.last().expect("at least the final snapshot");
    assert_eq!(last.total_bytes, Some(last.downloaded_bytes));
    assert!(h.ui.failures.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_package_is_deleted() {
    let server = MockServer::start().await.unwrap();
    server.route("/app.apk", MockResponse::ok(vec![0x42u8; 200 * 1024]));
    let offered = descriptor(OFFERED_CODE, server.url("/app.apk"));
    let h = HarnessBuilder::new(FixedVersions::offering(offered)).build();

    let outcome = h.orchestrator.check_now(true).await;

    assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::ValidationFailed { .. })), "{outcome:?}");
    assert!(!h.download_dir().join("app.apk").exists());
    assert!(h.installer.launched().is_empty());
    assert!(!h.orchestrator.store().query_pending().is_pending);
    assert_eq!(h.ui.failures.lock().unwrap().len(), 1);
    assert_eq!(h.orchestrator.state(), UpdateState::Idle);
}

#[tokio::test]
async fn test_checksum_mismatch_is_deleted() {
    let server = MockServer::start().await.unwrap();
    server.route("/app.apk", MockResponse::ok(package(OFFERED_CODE)));
    let mut offered = descriptor(OFFERED_CODE, server.url("/app.apk"));
    offered.sha256 = Some("0".repeat(64));
    let h = HarnessBuilder::new(FixedVersions::offering(offered)).build();

    let outcome = h.orchestrator.check_now(true).await;

    assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::ChecksumMismatch { .. })), "{outcome:?}");
    assert!(!h.download_dir().join("app.apk").exists());
    assert!(h.installer.launched().is_empty());
}

#[tokio::test]
async fn test_matching_checksum_is_accepted() {
    use sha2::{Digest, Sha256};

    let server = MockServer::start().await.unwrap();
    let bytes = package(OFFERED_CODE);
    let digest = hex::encode(Sha256::digest(&bytes));
    server.route("/app.apk", MockResponse::ok(bytes));
    let mut offered = descriptor(OFFERED_CODE, server.url("/app.apk"));
    offered.sha256 = Some(format!("sha256:{}", digest.to_uppercase()));
    let h = HarnessBuilder::new(FixedVersions::offering(offered)).build();

    let outcome = h.orchestrator.check_now(true).await;

    assert!(matches!(outcome, UpdateOutcome::HandedOff { .. }), "{outcome:?}");
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let server = MockServer::start().await.unwrap();
    let bytes = package(OFFERED_CODE);
    let truncated = MockResponse::ok(bytes[..1024].to_vec()).declare_length(bytes.len() as u64);
    server.route_sequence("/app.apk", vec![truncated, MockResponse::ok(bytes)]);
    let offered = descriptor(OFFERED_CODE, server.url("/app.apk"));
    let h = HarnessBuilder::new(FixedVersions::offering(offered)).build();

    let outcome = h.orchestrator.check_now(false).await;

    assert!(matches!(outcome, UpdateOutcome::HandedOff { .. }), "{outcome:?}");
    assert_eq!(server.hits("/app.apk"), 2);
    assert!(h.ui.states().contains(&UpdateState::Downloading {
        retry: 1
    }));
    let retries = h.ui.retries.lock().unwrap().clone();
    assert!(matches!(retries.first(), Some(RetryStatus::Scheduled { retry: 1, .. })), "{retries:?}");
}

#[tokio::test]
async fn test_up_to_date_only_reported_for_manual_checks() {
    let h = HarnessBuilder::new(FixedVersions::none()).build();

    assert!(matches!(h.orchestrator.check_now(false).await, UpdateOutcome::UpToDate));
    assert_eq!(h.ui.up_to_date.load(Ordering::SeqCst), 0);

    assert!(matches!(h.orchestrator.check_now(true).await, UpdateOutcome::UpToDate));
    assert_eq!(h.ui.up_to_date.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_older_release_is_not_offered() {
    let offered = descriptor(CURRENT_CODE, "https://invalid.invalid/app.apk".to_string());
    let h = HarnessBuilder::new(FixedVersions::offering(offered)).build();

    assert!(matches!(h.orchestrator.check_now(true).await, UpdateOutcome::UpToDate));
    assert!(h.installer.launched().is_empty());
}

#[tokio::test]
async fn test_check_failure_returns_to_idle() {
    let h = HarnessBuilder::new(FailingVersions).build();

    let outcome = h.orchestrator.check_now(true).await;

    assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::CheckFailed { .. })), "{outcome:?}");
    assert_eq!(h.orchestrator.state(), UpdateState::Idle);
}

#[tokio::test]
async fn test_declined_update_downloads_nothing() {
    let server = MockServer::start().await.unwrap();
    server.route("/app.apk", MockResponse::ok(package(OFFERED_CODE)));
    let offered = descriptor(OFFERED_CODE, server.url("/app.apk"));
    let h = HarnessBuilder::new(FixedVersions::offering(offered)).ui(RecordingUi::declining()).build();

    assert!(matches!(h.orchestrator.check_now(true).await, UpdateOutcome::Declined));
    assert_eq!(server.hits("/app.apk"), 0);
}

#[tokio::test]
async fn test_concurrent_check_is_ignored() {
    let versions = FixedVersions::none().slow(Duration::from_millis(200));
    let h = HarnessBuilder::new(versions).build();

    let (first, second) = tokio::join!(h.orchestrator.check_now(true), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.orchestrator.check_now(true).await
    });

    assert!(matches!(first, UpdateOutcome::UpToDate), "{first:?}");
    assert!(matches!(second, UpdateOutcome::AlreadyRunning), "{second:?}");

    // The flag is released once the first check ends
    assert!(matches!(h.orchestrator.check_now(true).await, UpdateOutcome::UpToDate));
}

#[tokio::test]
async fn test_new_download_cancels_running_one() {
    let server = MockServer::start().await.unwrap();
    server.route(
        "/slow/app-1.apk",
        MockResponse::ok(package(180)).throttled(4 * 1024, Duration::from_millis(50)),
    );
    server.route("/fast/app-2.apk", MockResponse::ok(package(OFFERED_CODE)));
    let h = HarnessBuilder::new(FixedVersions::none()).build();

    let slow = descriptor(180, server.url("/slow/app-1.apk"));
    let fast = descriptor(OFFERED_CODE, server.url("/fast/app-2.apk"));
    let (first, second) = tokio::join!(h.orchestrator.start_download(slow), async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        h.orchestrator.start_download(fast).await
    });

    assert!(matches!(first, UpdateOutcome::Cancelled), "{first:?}");
    assert!(matches!(second, UpdateOutcome::HandedOff { version_code: OFFERED_CODE, .. }), "{second:?}");
    assert_eq!(h.installer.launched(), vec![h.download_dir().join("app-2.apk")]);
    assert_eq!(h.orchestrator.store().query_pending().target_version_code, OFFERED_CODE);
    assert_eq!(h.orchestrator.state(), UpdateState::Idle);
}

#[tokio::test]
async fn test_cancel_stops_download() {
    let server = MockServer::start().await.unwrap();
    server.route(
        "/app.apk",
        MockResponse::ok(package(OFFERED_CODE)).throttled(4 * 1024, Duration::from_millis(50)),
    );
    let h = HarnessBuilder::new(FixedVersions::none()).build();
    let offered = descriptor(OFFERED_CODE, server.url("/app.apk"));

    let (outcome, ()) = tokio::join!(h.orchestrator.start_download(offered), async {
        tokio::time::sleep(Duration::from_millis(150)).await;
        h.orchestrator.cancel();
    });

    assert!(matches!(outcome, UpdateOutcome::Cancelled), "{outcome:?}");
    assert!(h.installer.launched().is_empty());
    assert!(!h.orchestrator.store().query_pending().is_pending);
    assert_eq!(h.orchestrator.state(), UpdateState::Idle);
}

#[tokio::test]
async fn test_cancel_during_retry_countdown_is_prompt() {
    let server = MockServer::start().await.unwrap();
    let bytes = package(OFFERED_CODE);
    server.route("/app.apk", MockResponse::ok(bytes[..1024].to_vec()).declare_length(bytes.len() as u64));
    let h = HarnessBuilder::new(FixedVersions::none())
        .retry(RetryPolicy::new(20, Duration::from_secs(5)))
        .build();
    let offered = descriptor(OFFERED_CODE, server.url("/app.apk"));

    let started = std::time::Instant::now();
    let (outcome, ()) = tokio::join!(h.orchestrator.start_download(offered), async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        h.orchestrator.cancel();
    });

    assert!(matches!(outcome, UpdateOutcome::Cancelled), "{outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
    assert_eq!(server.hits("/app.apk"), 1);
    assert!(!h.ui.states().contains(&UpdateState::Downloading {
        retry: 2
    }));
    assert_eq!(h.orchestrator.state(), UpdateState::Idle);
}

#[tokio::test]
async fn test_missing_permission_pauses_until_resume() {
    let server = MockServer::start().await.unwrap();
    server.route("/app.apk", MockResponse::ok(package(OFFERED_CODE)));
    let offered = descriptor(OFFERED_CODE, server.url("/app.apk"));
    let h = HarnessBuilder::new(FixedVersions::offering(offered)).permission(false).build();

    assert!(matches!(h.orchestrator.check_now(true).await, UpdateOutcome::AwaitingPermission));
    assert_eq!(h.orchestrator.state(), UpdateState::AwaitingPermission);
    assert_eq!(h.ui.permission_prompts.load(Ordering::SeqCst), 1);
    assert_eq!(h.permission.requests.load(Ordering::SeqCst), 1);
    assert_eq!(server.hits("/app.apk"), 0);

    // Still not granted
    assert!(h.orchestrator.on_resume().await.is_none());

    h.permission.grant();
    let resumed = h.orchestrator.on_resume().await;
    assert!(matches!(resumed, Some(UpdateOutcome::HandedOff { .. })), "{resumed:?}");
    assert_eq!(h.installer.launched().len(), 1);

    // Nothing left to resume
    assert!(h.orchestrator.on_resume().await.is_none());
}

#[tokio::test]
async fn test_auto_check_runs_once() {
    let versions = Arc::new(FixedVersions::none());
    let mut builder = HarnessBuilder::new(FixedVersions::none());
    builder.versions = versions.clone();
    let h = builder.build();

    assert!(matches!(h.orchestrator.maybe_auto_check().await, Some(UpdateOutcome::UpToDate)));
    assert!(h.orchestrator.maybe_auto_check().await.is_none());
    assert_eq!(versions.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.ui.up_to_date.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_watch_rechecks_on_interval() {
    let versions = Arc::new(FixedVersions::none());
    let mut builder = HarnessBuilder::new(FixedVersions::none());
    builder.versions = versions.clone();
    let h = builder.build();
    let shutdown = CancellationToken::new();

    let (outcome, ()) = tokio::join!(h.orchestrator.watch(Duration::from_secs(180), &shutdown), async {
        tokio::time::sleep(Duration::from_secs(7 * 60)).await;
        shutdown.cancel();
    });

    assert!(outcome.is_none());
    // Immediately, then at 3 and 6 minutes
    assert_eq!(versions.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.ui.up_to_date.load(Ordering::SeqCst), 0);
    assert_eq!(h.orchestrator.state(), UpdateState::Idle);
}

#[tokio::test]
async fn test_watch_stops_after_handoff() {
    let server = MockServer::start().await.unwrap();
    server.route("/app.apk", MockResponse::ok(package(OFFERED_CODE)));
    let offered = descriptor(OFFERED_CODE, server.url("/app.apk"));
    let h = HarnessBuilder::new(FixedVersions::offering(offered)).build();
    let shutdown = CancellationToken::new();

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        h.orchestrator.watch(Duration::from_millis(50), &shutdown),
    )
    .await
    .unwrap();

    assert!(matches!(outcome, Some(UpdateOutcome::HandedOff { version_code: OFFERED_CODE, .. })), "{outcome:?}");
    assert_eq!(h.installer.launched().len(), 1);
}

#[tokio::test]
async fn test_failed_launch_clears_pending_record() {
    let server = MockServer::start().await.unwrap();
    server.route("/app.apk", MockResponse::ok(package(OFFERED_CODE)));
    let offered = descriptor(OFFERED_CODE, server.url("/app.apk"));
    let h = HarnessBuilder::new(FixedVersions::offering(offered))
        .installer(RecordingInstaller::failing())
        .build();

    let outcome = h.orchestrator.check_now(true).await;

    assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::InstallLaunchFailed { .. })), "{outcome:?}");
    assert_eq!(h.installer.launched().len(), 1);
    assert!(!h.orchestrator.store().query_pending().is_pending);
}

#[tokio::test]
async fn test_resolve_failure_is_reported() {
    let server = MockServer::start().await.unwrap();
    server.route("/short", MockResponse::status(404));
    let offered = descriptor(OFFERED_CODE, server.url("/short"));
    let h = HarnessBuilder::new(FixedVersions::offering(offered)).build();

    let outcome = h.orchestrator.check_now(true).await;

    assert!(matches!(outcome, UpdateOutcome::Failed(UpdateError::ResolveFailed { .. })), "{outcome:?}");
    assert_eq!(h.orchestrator.state(), UpdateState::Idle);
}
