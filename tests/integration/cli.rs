use assert_cmd::Command;
use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use serde_json::json;
use serial_test::serial;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use sideload::config::{CONFIG_PATH_ENV, STATE_PATH_ENV};
use sideload::state::InstallStateStore;
use sideload::test_utils::{ManifestSpec, MockResponse, MockServer, package_bytes, write_package};

/// A scratch config directory with an optional `config.toml`.
struct CliEnv {
    temp: TempDir,
}

impl CliEnv {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn with_config(content: &str) -> Self {
        let env = Self::new();
        std::fs::write(env.config_path(), content).unwrap();
        env
    }

    fn config_path(&self) -> PathBuf {
        self.temp.path().join("config.toml")
    }

    fn store(&self) -> InstallStateStore {
        InstallStateStore::new(self.temp.path().join("install_state.json"))
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("sideload").unwrap();
        cmd.arg("--config")
            .arg(self.config_path())
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .env_remove(CONFIG_PATH_ENV)
            .env_remove(STATE_PATH_ENV);
        cmd
    }
}

/// Run the binary off the async runtime so the mock server keeps serving.
async fn run_blocking(mut cmd: Command) -> std::process::Output {
    tokio::task::spawn_blocking(move || cmd.output()).await.unwrap().unwrap()
}

fn write_fixture(path: &Path, version_code: u32) {
    write_package(path, &ManifestSpec::new("com.example.app", version_code, "2.0.0")).unwrap();
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("sideload")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upgrade"))
        .stdout(predicate::str::contains("confirm"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_validate_accepts_package() {
    let env = CliEnv::new();
    let apk = env.path("app.apk");
    write_fixture(&apk, 200);

    env.command()
        .arg("validate")
        .arg(&apk)
        .assert()
        .success()
        .stdout(predicate::str::contains("is a valid package"))
        .stdout(predicate::str::contains("package: com.example.app"))
        .stdout(predicate::str::contains("version code: 200"));
}

#[test]
fn test_validate_rejects_non_package() {
    let env = CliEnv::new();
    let file = env.path("page.apk");
    std::fs::write(&file, "<html>not a package</html>").unwrap();

    env.command()
        .arg("validate")
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error"));
    assert!(file.exists(), "validate never deletes");
}

#[test]
fn test_status_without_pending_install() {
    let env = CliEnv::new();

    env.command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No install pending"));
}

#[test]
fn test_status_reports_pending_install() {
    let env = CliEnv::new();
    let apk = env.path("updates/app.apk");
    env.store().mark_pending(200, "2.0.0", &apk).unwrap();

    env.command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("version 2.0.0 (200)"));

    let output = env.command().args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["is_pending"], json!(true));
    assert_eq!(record["target_version_code"], json!(200));
}

#[test]
#[serial]
fn test_state_path_environment_override() {
    let env = CliEnv::new();
    let elsewhere = env.path("custom/state.json");
    InstallStateStore::new(&elsewhere).mark_pending(7, "0.7", &env.path("x.apk")).unwrap();

    env.command()
        .env(STATE_PATH_ENV, &elsewhere)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("version 0.7 (7)"));
}

#[test]
fn test_confirm_clears_reached_install() {
    let env = CliEnv::new();
    let apk = env.path("updates/app-2.0.apk");
    std::fs::create_dir_all(apk.parent().unwrap()).unwrap();
    write_fixture(&apk, 200);
    env.store().mark_pending(200, "2.0.0", &apk).unwrap();

    env.command()
        .args(["confirm", "--current-version-code", "200"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated to").and(predicate::str::contains("2.0.0")));

    assert!(!apk.exists());
    assert!(!env.store().query_pending().is_pending);

    // Second start: nothing to confirm, nothing printed
    env.command()
        .args(["confirm", "--current-version-code", "200"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_confirm_keeps_unfinished_install() {
    let env = CliEnv::with_config("[app]\nversion_code = 150\nversion_name = \"1.5.0\"\n");
    let apk = env.path("app.apk");
    write_fixture(&apk, 200);
    env.store().mark_pending(200, "2.0.0", &apk).unwrap();

    env.command()
        .arg("confirm")
        .assert()
        .success()
        .stdout(predicate::str::contains("not finished yet"));

    assert!(apk.exists());
    assert!(env.store().query_pending().is_pending);
}

#[test]
fn test_invalid_config_fails() {
    let env = CliEnv::with_config("[server]\ncheck_endpoints = [\"not a url\"]\n");

    env.command().arg("status").assert().code(1).stderr(predicate::str::contains("error"));
}

#[test]
fn test_resolve_direct_link() {
    let env = CliEnv::new();

    env.command()
        .args(["--quiet", "resolve", "https://invalid.invalid/builds/app-2.0.apk"])
        .assert()
        .success()
        .stdout("https://invalid.invalid/builds/app-2.0.apk\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_saves_valid_package() {
    let server = MockServer::start().await.unwrap();
    let bytes = package_bytes(&ManifestSpec::new("com.example.app", 200, "2.0.0")).unwrap();
    server.route("/short/latest", MockResponse::redirect(302, "/files/app-2.0.apk"));
    server.route("/files/app-2.0.apk", MockResponse::ok(bytes.clone()));

    let env = CliEnv::new();
    let out = env.path("downloaded.apk");
    let mut cmd = env.command();
    cmd.args(["--no-progress", "download"]).arg(server.url("/short/latest")).arg("--output").arg(&out);

    run_blocking(cmd).await.assert().success().stdout(predicate::str::contains("Saved"));
    assert_eq!(std::fs::read(&out).unwrap(), bytes);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_deletes_invalid_package() {
    let server = MockServer::start().await.unwrap();
    server.route("/app.apk", MockResponse::ok(vec![0u8; 150 * 1024]));

    let env = CliEnv::new();
    let out = env.path("broken.apk");
    let mut cmd = env.command();
    cmd.args(["--no-progress", "download"]).arg(server.url("/app.apk")).arg("--output").arg(&out);

    run_blocking(cmd).await.assert().code(1);
    assert!(!out.exists());
}

fn server_config(server: &MockServer, extra: &str) -> String {
    format!(
        "[app]\nversion_code = 150\nversion_name = \"1.5.0\"\n\n[server]\ncheck_endpoints = [\"{}\"]\nchangelog_endpoints = [\"{}\"]\n{extra}",
        server.url("/api/update/check"),
        server.url("/api/changelog"),
    )
}

fn offer(server: &MockServer) {
    server.route(
        "/api/update/check",
        MockResponse::json(&json!({
            "ok": true,
            "update_available": true,
            "latest": {
                "versionCode": 200,
                "versionName": "2.0.0",
                "downloadUrl": server.url("/files/app-2.0.apk"),
                "releaseDate": "2025-07-03T14:05:09Z",
                "mandatory": false,
                "changelog": "Old notes"
            }
        })),
    );
    server.route(
        "/api/changelog/200",
        MockResponse::json(&json!({ "versionName": "2.0.0", "changelog": "Faster downloads" })),
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_reports_available_update() {
    let server = MockServer::start().await.unwrap();
    offer(&server);

    let env = CliEnv::with_config(&server_config(&server, ""));
    let mut cmd = env.command();
    cmd.arg("check");

    run_blocking(cmd)
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Update available:"))
        .stdout(predicate::str::contains("2.0.0"))
        .stdout(predicate::str::contains("Faster downloads"));

    let check = server.requests().into_iter().find(|r| r.starts_with("/api/update/check")).unwrap();
    assert!(check.contains("versionCode=150"), "{check}");
    assert!(check.contains("locale=en"), "{check}");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_when_up_to_date() {
    let server = MockServer::start().await.unwrap();
    server.route("/api/update/check", MockResponse::json(&json!({ "ok": true, "update_available": false })));

    let env = CliEnv::with_config(&server_config(&server, ""));
    let mut cmd = env.command();
    cmd.arg("check");

    run_blocking(cmd).await.assert().success().stdout(predicate::str::contains("is the latest version"));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_then_confirm() {
    let server = MockServer::start().await.unwrap();
    offer(&server);
    let bytes = package_bytes(&ManifestSpec::new("com.example.app", 200, "2.0.0")).unwrap();
    server.route("/files/app-2.0.apk", MockResponse::ok(bytes));

    let env = CliEnv::with_config(&server_config(&server, "\n[install]\ncommand = [\"true\"]\n"));
    let mut cmd = env.command();
    cmd.args(["--no-progress", "upgrade", "--yes"]);

    run_blocking(cmd).await.assert().success().stdout(predicate::str::contains("Installer launched for version 200"));

    let apk = env.path("updates/app-2.0.apk");
    assert!(apk.exists());
    let pending = env.store().query_pending();
    assert!(pending.is_pending);
    assert_eq!(pending.target_version_code, 200);

    env.command()
        .args(["confirm", "--current-version-code", "200"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated to").and(predicate::str::contains("2.0.0")));
    assert!(!apk.exists());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_watch_exits_after_handoff() {
    let server = MockServer::start().await.unwrap();
    offer(&server);
    let bytes = package_bytes(&ManifestSpec::new("com.example.app", 200, "2.0.0")).unwrap();
    server.route("/files/app-2.0.apk", MockResponse::ok(bytes));

    let env = CliEnv::with_config(&server_config(
        &server,
        "check_interval_secs = 1\n\n[install]\ncommand = [\"true\"]\n",
    ));
    let mut cmd = env.command();
    cmd.args(["--no-progress", "upgrade", "--yes", "--watch"]);

    run_blocking(cmd)
        .await
        .assert()
        .success()
        .stdout(predicate::str::contains("Watching for updates every 1 seconds"))
        .stdout(predicate::str::contains("Installer launched for version 200"));
    assert!(env.store().query_pending().is_pending);
}
