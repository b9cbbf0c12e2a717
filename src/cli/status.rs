use anyhow::Result;
use clap::Args;
use colored::Colorize;

use super::CommandContext;

/// Print the pending-install record.
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Print the raw JSON record.
    #[arg(long)]
    pub json: bool,
}

impl StatusCommand {
    pub fn execute(self, ctx: &CommandContext) -> Result<()> {
        let store = ctx.store();
        let state = store.query_pending();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&state)?);
            return Ok(());
        }

        if !state.is_pending {
            println!("No install pending");
            return Ok(());
        }

        println!(
            "{} version {} ({}) handed to the installer",
            "Pending:".yellow().bold(),
            state.target_version_name,
            state.target_version_code
        );
        println!("  package: {}", state.apk_file_path);
        println!(
            "  running: {} ({})",
            ctx.config.app.version_name, ctx.config.app.version_code
        );
        Ok(())
    }
}
