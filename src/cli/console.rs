//! Terminal implementation of the update UI.

use colored::Colorize;
use std::io::{BufRead, Write};
use std::sync::Mutex;

use crate::core::UpdateError;
use crate::download::{DownloadProgress, RetryStatus};
use crate::upgrade::{CurrentVersion, UpdateDescriptor, UpdateState, UpdateUi};
use crate::utils::DownloadBar;

/// Prints offers and outcomes to stdout and renders download progress with
/// an `indicatif` bar. The bar only appears once a download starts, so the
/// consent prompt is never drawn over.
pub struct ConsoleUi {
    bar: Mutex<Option<DownloadBar>>,
    hide_progress: bool,
    assume_yes: bool,
}

impl ConsoleUi {
    pub fn new(hide_progress: bool, assume_yes: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            hide_progress,
            assume_yes,
        }
    }

    fn with_bar(&self, f: impl FnOnce(&DownloadBar)) {
        if let Ok(mut bar) = self.bar.lock() {
            let bar = bar.get_or_insert_with(|| DownloadBar::new(self.hide_progress));
            f(bar);
        }
    }

    fn clear_bar(&self) {
        if let Some(bar) = self.bar.lock().ok().and_then(|mut bar| bar.take()) {
            bar.finish_and_clear();
        }
    }
}

/// Print the release notes block shared by `check` and `upgrade`.
pub(crate) fn print_descriptor(descriptor: &UpdateDescriptor) {
    println!(
        "{} {} ({})",
        "Update available:".green().bold(),
        descriptor.version_name.bold(),
        descriptor.version_code
    );
    if let Some(date) = &descriptor.release_date {
        println!("  Released: {date}");
    }
    if descriptor.mandatory {
        println!("  {}", "This update is mandatory".yellow());
    }
    if !descriptor.changelog.trim().is_empty() {
        println!("\n{}", descriptor.changelog.trim());
    }
}

impl UpdateUi for ConsoleUi {
    fn state_changed(&self, state: &UpdateState) {
        let status = match state {
            UpdateState::LinkResolving => "Resolving download link...",
            UpdateState::Downloading {
                retry: 0,
            } => "Downloading...",
            UpdateState::Validating => "Validating package...",
            UpdateState::HandoffPending => "Launching installer...",
            UpdateState::Idle => {
                self.clear_bar();
                return;
            }
            _ => return,
        };
        self.with_bar(|bar| bar.set_status(status));
    }

    fn update_available(&self, descriptor: &UpdateDescriptor) -> bool {
        print_descriptor(descriptor);
        if self.assume_yes {
            return true;
        }

        print!("\nDownload and install {}? [y/N] ", descriptor.version_name);
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        if std::io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }

    fn up_to_date(&self, current: &CurrentVersion) {
        println!(
            "{} {} ({}) is the latest version",
            "✓".green(),
            current.version_name,
            current.version_code
        );
    }

    fn check_failed(&self, _error: &UpdateError) {
        self.clear_bar();
    }

    fn progress(&self, progress: &DownloadProgress, progress_text: &str, eta_text: &str) {
        self.with_bar(|bar| bar.update(progress, progress_text, eta_text));
    }

    fn retrying(&self, status: &RetryStatus) {
        self.with_bar(|bar| bar.set_status(status.message()));
    }

    fn permission_required(&self, descriptor: &UpdateDescriptor) {
        self.clear_bar();
        println!(
            "{} installing {} requires permission to install packages from this source",
            "!".yellow().bold(),
            descriptor.version_name
        );
    }

    fn failed(&self, _error: &UpdateError) {
        self.clear_bar();
    }

    fn install_confirmed(&self, version_name: Option<&str>) {
        match version_name {
            Some(name) => println!("{} Updated to {} successfully", "✓".green(), name.bold()),
            None => println!("{} Update installed successfully", "✓".green()),
        }
    }
}
