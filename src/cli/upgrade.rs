use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::CommandContext;
use super::console::ConsoleUi;
use crate::core::UpdateError;
use crate::upgrade::{
    AlwaysGranted, Collaborators, CommandInstaller, HttpVersionSource, OrchestratorSettings,
    UpdateOrchestrator, UpdateOutcome,
};

/// Run the complete update job against the configured server.
///
/// ```bash
/// sideload upgrade          # asks before downloading
/// sideload upgrade --yes    # no prompt
/// sideload upgrade --watch  # re-check every server.check_interval_secs
/// ```
#[derive(Args, Debug)]
pub struct UpgradeCommand {
    /// Install without asking for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Keep checking in the background until an update is handed off or Ctrl-C.
    #[arg(short, long)]
    pub watch: bool,
}

impl UpgradeCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let clients = ctx.clients()?;
        let source = Arc::new(HttpVersionSource::new(&clients, &ctx.config.server));

        let collaborators = Collaborators {
            versions: source.clone(),
            changelogs: Some(source),
            installer: Arc::new(CommandInstaller::from_config(&ctx.config.install)?),
            permission: Arc::new(AlwaysGranted),
            ui: Arc::new(ConsoleUi::new(ctx.no_progress, self.yes)),
        };
        let settings = OrchestratorSettings {
            current: ctx.current_version(),
            locale: ctx.config.app.locale.clone(),
            download_dir: ctx.download_dir(),
            retry: ctx.retry_policy(),
            verify_checksum: ctx.config.download.verify_checksum,
        };

        let orchestrator = UpdateOrchestrator::new(
            ctx.resolver(&clients),
            ctx.downloader(&clients),
            ctx.store(),
            collaborators,
            settings,
        );

        let outcome = if self.watch {
            let every = ctx.config.server.check_interval();
            println!("Watching for updates every {} seconds (Ctrl-C to stop)", every.as_secs());
            let shutdown = CancellationToken::new();
            let watch = orchestrator.watch(every, &shutdown);
            tokio::pin!(watch);
            let watched = tokio::select! {
                outcome = &mut watch => outcome,
                _ = tokio::signal::ctrl_c() => {
                    shutdown.cancel();
                    watch.await
                }
            };
            let Some(outcome) = watched else {
                println!("Stopped watching for updates");
                return Ok(());
            };
            outcome
        } else {
            tokio::select! {
                outcome = orchestrator.check_now(true) => outcome,
                _ = tokio::signal::ctrl_c() => {
                    orchestrator.cancel();
                    UpdateOutcome::Cancelled
                }
            }
        };

        match outcome {
            UpdateOutcome::HandedOff {
                version_code,
                package,
            } => {
                println!(
                    "{} Installer launched for version {} ({})",
                    "✓".green(),
                    version_code,
                    package.display()
                );
                println!("Run {} after the new version starts.", "sideload confirm".cyan());
                Ok(())
            }
            UpdateOutcome::UpToDate | UpdateOutcome::AlreadyRunning => Ok(()),
            UpdateOutcome::Declined => {
                println!("Update skipped");
                Ok(())
            }
            UpdateOutcome::AwaitingPermission => {
                println!("Grant the install permission and run the upgrade again.");
                Ok(())
            }
            UpdateOutcome::Cancelled => Err(UpdateError::Cancelled.into()),
            UpdateOutcome::Failed(e) => Err(e.into()),
        }
    }
}
