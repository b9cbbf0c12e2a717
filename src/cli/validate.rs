use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::CommandContext;
use crate::package::PackageValidator;

/// Check that a file is an installable package and print its identity.
///
/// Exits non-zero for anything that is not a readable package with a package
/// name. The file is never modified.
#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

impl ValidateCommand {
    pub async fn execute(self, _ctx: &CommandContext) -> Result<()> {
        let file = self.file.clone();
        let info = tokio::task::spawn_blocking(move || PackageValidator::new().inspect(&file)).await??;

        println!("{} {} is a valid package", "✓".green(), self.file.display());
        println!("  package: {}", info.package_name);
        if let Some(code) = info.version_code {
            println!("  version code: {code}");
        }
        if let Some(name) = &info.version_name {
            println!("  version name: {name}");
        }
        Ok(())
    }
}
