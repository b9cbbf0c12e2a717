use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use super::CommandContext;
use crate::download::format::{format_progress, format_remaining, format_size};
use crate::package::PackageValidator;
use crate::upgrade::destination_for;
use crate::utils::{DownloadBar, remove_file_if_exists};

/// Resolve a link, download it with retries and validate the result.
///
/// Invalid packages are deleted.
#[derive(Args, Debug)]
pub struct DownloadCommand {
    /// Direct link, file-host page, drive share or release page.
    #[arg(value_name = "URL")]
    pub url: String,

    /// Where to save the package (default: the configured download directory).
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl DownloadCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let clients = ctx.clients()?;
        let resolved = ctx.resolver(&clients).resolve(&self.url).await?;
        let dest = self.output.unwrap_or_else(|| destination_for(&ctx.download_dir(), &resolved));

        let downloader = ctx.downloader(&clients);
        let cancel = CancellationToken::new();
        let bar = DownloadBar::new(ctx.no_progress);
        bar.set_status(format!("Downloading {}", resolved.direct_url));

        let policy = ctx.retry_policy();
        let download = policy.run(
            &cancel,
            |_| {
                downloader.download(&resolved.direct_url, &dest, &cancel, |p| {
                    bar.update(&p, &format_progress(&p), &format_remaining(p.eta_seconds));
                })
            },
            |status| bar.set_status(status.message()),
        );

        let bytes = tokio::select! {
            result = download => result,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                Err(crate::core::UpdateError::Cancelled)
            }
        };
        let bytes = match bytes {
            Ok(bytes) => bytes,
            Err(e) => {
                bar.finish_and_clear();
                return Err(e.into());
            }
        };

        bar.set_status("Validating package...");
        let path = dest.clone();
        let info = tokio::task::spawn_blocking(move || PackageValidator::new().inspect(&path))
            .await
            .context("Validation task failed")?;
        bar.finish_and_clear();

        let info = match info {
            Ok(info) => info,
            Err(e) => {
                remove_file_if_exists(&dest)?;
                return Err(e.into());
            }
        };

        println!("{} Saved {} ({})", "✓".green(), dest.display(), format_size(bytes));
        println!(
            "  package: {}  version: {} ({})",
            info.package_name,
            info.version_name.as_deref().unwrap_or("-"),
            info.version_code.map_or_else(|| "-".to_string(), |c| c.to_string())
        );
        Ok(())
    }
}
