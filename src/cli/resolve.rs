use anyhow::Result;
use clap::Args;

use super::CommandContext;

/// Print the direct package URL behind a link.
#[derive(Args, Debug)]
pub struct ResolveCommand {
    /// Direct link, file-host page, drive share or release page.
    #[arg(value_name = "URL")]
    pub url: String,
}

impl ResolveCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let clients = ctx.clients()?;
        let resolved = ctx.resolver(&clients).resolve(&self.url).await?;

        println!("{}", resolved.direct_url);
        if !ctx.quiet {
            eprintln!("  type: {}", resolved.link_type);
            if let Some(name) = &resolved.suggested_file_name {
                eprintln!("  file: {name}");
            }
        }
        Ok(())
    }
}
