use std::path::Path;

use anyhow::{Context, Result};
use ini::Ini;
use serde::Serialize;
use tokio::fs;

use super::SessionCredentials;
use crate::constants::get_aws_credentials_path;

/// Output of an AWS `credential_process`
/// <https://docs.aws.amazon.com/cli/latest/userguide/cli-configure-sourcing-external.html>
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ProcessCredentials {
    pub version: u8,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: String,
}

impl From<&SessionCredentials> for ProcessCredentials {
    fn from(creds: &SessionCredentials) -> Self {
        Self {
            version: 1,
            access_key_id: creds.access_key_id.clone(),
            secret_access_key: creds.secret_access_key.clone(),
            session_token: creds.session_token.clone(),
            expiration: creds.expiration(),
        }
    }
}

impl ProcessCredentials {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize process credentials")
    }
}

/// Save credentials to AWS credentials file
pub async fn save_credentials(profile: &str, creds: &SessionCredentials) -> Result<()> {
    let path = get_aws_credentials_path().context("Failed to determine AWS credentials path")?;
    write_profile(&path, profile, creds).await
}

async fn write_profile(path: &Path, profile: &str, creds: &SessionCredentials) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut ini = path
        .exists()
        .then(|| Ini::load_from_file(path).ok())
        .flatten()
        .unwrap_or_else(Ini::new);

    ini.with_section(Some(profile))
        .set("aws_access_key_id", &creds.access_key_id)
        .set("aws_secret_access_key", &creds.secret_access_key)
        .set("aws_session_token", &creds.session_token)
        .set("aws_session_expiration", creds.expiration());

    ini.write_to_file(path)
        .context("Failed to write credentials file")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = fs::metadata(path).await?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions).await?;
    }

    tracing::info!("Credentials saved to profile: {}", profile);
    Ok(())
}
