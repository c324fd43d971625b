use anyhow::{Context, Result};
use clap::Args;

use super::SourceArgs;
use crate::aws::credentials;

#[derive(Debug, Clone, Args)]
pub struct ExportCommand {
    #[arg(
        short = 'p',
        long,
        default_value = "default",
        help = "AWS profile name to write"
    )]
    pub profile: String,
}

impl ExportCommand {
    pub async fn execute(self, source: &SourceArgs) -> Result<()> {
        let provider = source.provider().await?;
        let creds = provider
            .credentials()
            .await
            .context("Failed to obtain AWS credentials")?;

        credentials::save_credentials(&self.profile, &creds)
            .await
            .with_context(|| format!("Failed to save credentials to profile '{}'", self.profile))?;

        println!(
            "Credentials saved to profile '{}' (expires {})",
            self.profile,
            creds.expiration()
        );
        Ok(())
    }
}
