use std::sync::Mutex;
use tempfile::TempDir;

use sideload::state::InstallStateStore;
use sideload::test_utils::{ManifestSpec, write_package};
use sideload::upgrade::{PostInstallCheck, PostInstallOutcome, UpdateState, UpdateUi};

#[derive(Default)]
struct ConfirmationUi {
    states: Mutex<Vec<UpdateState>>,
    confirmed: Mutex<Vec<Option<String>>>,
}

impl UpdateUi for ConfirmationUi {
    fn state_changed(&self, state: &UpdateState) {
        self.states.lock().unwrap().push(state.clone());
    }

    fn install_confirmed(&self, version_name: Option<&str>) {
        self.confirmed.lock().unwrap().push(version_name.map(str::to_string));
    }
}

fn pending_install(temp: &TempDir) -> (InstallStateStore, std::path::PathBuf) {
    let apk = temp.path().join("updates/app-2.0.apk");
    std::fs::create_dir_all(apk.parent().unwrap()).unwrap();
    write_package(&apk, &ManifestSpec::new("com.example.app", 200, "2.0.0")).unwrap();

    let store = InstallStateStore::new(temp.path().join("install_state.json"));
    store.mark_pending(200, "2.0.0", &apk).unwrap();
    (store, apk)
}

#[test]
fn test_confirmation_happens_exactly_once() {
    let temp = TempDir::new().unwrap();
    let (store, apk) = pending_install(&temp);
    let ui = ConfirmationUi::default();

    let first = PostInstallCheck::run(&store, 200, &ui).unwrap();
    assert_eq!(
        first,
        PostInstallOutcome::Confirmed {
            version_name: Some("2.0.0".to_string())
        }
    );
    assert!(!apk.exists());
    assert!(!store.query_pending().is_pending);

    let second = PostInstallCheck::run(&store, 200, &ui).unwrap();
    assert_eq!(second, PostInstallOutcome::NotPending);

    assert_eq!(*ui.confirmed.lock().unwrap(), vec![Some("2.0.0".to_string())]);
    assert_eq!(*ui.states.lock().unwrap(), vec![UpdateState::Confirming, UpdateState::Idle]);
}

#[test]
fn test_unfinished_install_stays_pending() {
    let temp = TempDir::new().unwrap();
    let (store, apk) = pending_install(&temp);
    let ui = ConfirmationUi::default();

    let outcome = PostInstallCheck::run(&store, 150, &ui).unwrap();

    assert_eq!(
        outcome,
        PostInstallOutcome::StillPending {
            target_version_code: 200
        }
    );
    assert!(apk.exists());
    assert!(store.query_pending().is_pending);
    assert!(ui.confirmed.lock().unwrap().is_empty());
}

#[test]
fn test_newer_running_version_also_confirms() {
    let temp = TempDir::new().unwrap();
    let (store, _) = pending_install(&temp);
    let ui = ConfirmationUi::default();

    let outcome = PostInstallCheck::run(&store, 250, &ui).unwrap();

    assert!(matches!(outcome, PostInstallOutcome::Confirmed { .. }));
}

#[test]
fn test_missing_package_file_still_confirms() {
    let temp = TempDir::new().unwrap();
    let (store, apk) = pending_install(&temp);
    std::fs::remove_file(&apk).unwrap();
    let ui = ConfirmationUi::default();

    let outcome = PostInstallCheck::run(&store, 200, &ui).unwrap();

    assert!(matches!(outcome, PostInstallOutcome::Confirmed { .. }));
    assert!(!store.query_pending().is_pending);
}

#[test]
fn test_record_survives_a_new_store_instance() {
    let temp = TempDir::new().unwrap();
    let (store, _) = pending_install(&temp);
    drop(store);

    let reopened = InstallStateStore::new(temp.path().join("install_state.json"));
    let ui = ConfirmationUi::default();

    let outcome = PostInstallCheck::run(&reopened, 200, &ui).unwrap();
    assert!(matches!(outcome, PostInstallOutcome::Confirmed { .. }));
}
