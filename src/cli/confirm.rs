use anyhow::Result;
use clap::Args;

use super::CommandContext;
use super::console::ConsoleUi;
use crate::upgrade::{PostInstallCheck, PostInstallOutcome};

/// App-start hook: confirm a handed-off install once the running version
/// reaches it, then remove the leftover package.
///
/// Safe to run on every start. Prints nothing when no install is pending.
#[derive(Args, Debug)]
pub struct ConfirmCommand {
    /// Version code of the running application (default: `app.version_code`).
    #[arg(long, value_name = "N")]
    pub current_version_code: Option<u32>,
}

impl ConfirmCommand {
    pub fn execute(self, ctx: &CommandContext) -> Result<()> {
        let current = self.current_version_code.unwrap_or(ctx.config.app.version_code);
        let ui = ConsoleUi::new(true, true);

        match PostInstallCheck::run(&ctx.store(), current, &ui)? {
            PostInstallOutcome::StillPending {
                target_version_code,
            } if !ctx.quiet => {
                println!("Install of version {target_version_code} not finished yet (running {current})");
            }
            _ => {}
        }
        Ok(())
    }
}
