use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CommandContext;
use super::console::print_descriptor;
use crate::upgrade::{HttpVersionSource, check_for_update};

/// Report whether a newer release exists, without downloading it.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Locale for the release notes (default: `app.locale` from the config).
    #[arg(long)]
    pub locale: Option<String>,
}

impl CheckCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let clients = ctx.clients()?;
        let source = HttpVersionSource::new(&clients, &ctx.config.server);
        let current = ctx.current_version();
        let locale = self.locale.unwrap_or_else(|| ctx.config.app.locale.clone());

        match check_for_update(&source, Some(&source), &current, &locale).await? {
            Some(descriptor) => {
                print_descriptor(&descriptor);
                println!("\nRun {} to install it.", "sideload upgrade".cyan());
            }
            None => println!(
                "{} {} ({}) is the latest version",
                "✓".green(),
                current.version_name,
                current.version_code
            ),
        }
        Ok(())
    }
}
