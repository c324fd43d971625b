use anyhow::{Context, Result};
use tracing::info;

use super::SourceArgs;
use crate::aws::credentials::ProcessCredentials;

/// Print credentials in the AWS `credential_process` format
pub async fn execute(source: &SourceArgs) -> Result<()> {
    let provider = source.provider().await?;
    let creds = provider
        .credentials()
        .await
        .context("Failed to obtain AWS credentials")?;

    info!("Credentials expire at: {}", creds.expiration());
    println!("{}", ProcessCredentials::from(&creds).to_json()?);
    Ok(())
}
