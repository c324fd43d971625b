pub mod completions;
pub mod export;
pub mod process;

pub use completions::CompletionsCommand;
pub use export::ExportCommand;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::{
    aws::StsExchangeClient,
    constants::{DEFAULT_AUDIENCE, DEFAULT_SESSION_DURATION_SECS, ENV_ROLE_ARN},
    provider::CredentialExchangeProvider,
    token::{
        AccessTokenSource, CachedTokenSource, IdentityTokenSource, ImpersonatedServiceAccount,
        MetadataServer, ServiceAccountKey, ServiceAccountKeyIssuer, TokenIssuer,
    },
};

/// Where the Google identity comes from and which AWS role it is exchanged for
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    #[arg(long, global = true, env = ENV_ROLE_ARN, help = "AWS IAM role ARN to assume")]
    pub role_arn: Option<String>,

    #[arg(long, global = true, help = "STS role session name")]
    pub session_name: Option<String>,

    #[arg(long, global = true, default_value = DEFAULT_AUDIENCE, help = "Audience of the Google ID token")]
    pub audience: String,

    #[arg(
        long,
        global = true,
        help = "Google service account JSON key file (defaults to the metadata server)"
    )]
    pub credential_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Service account to impersonate")]
    pub impersonate_service_account: Option<String>,

    #[arg(
        long = "delegate",
        global = true,
        requires = "impersonate_service_account",
        help = "Delegate in the impersonation chain (repeatable)"
    )]
    pub delegates: Vec<String>,

    #[arg(long, global = true, default_value_t = DEFAULT_SESSION_DURATION_SECS, help = "Requested session duration in seconds")]
    pub duration: i32,

    #[arg(long, global = true, help = "AWS region of the STS endpoint")]
    pub region: Option<String>,

    #[arg(long, global = true, help = "Inline JSON session policy restricting the assumed role")]
    pub policy: Option<String>,
}

impl SourceArgs {
    /// Build the provider, loading the AWS SDK config for STS
    pub async fn provider(&self) -> Result<CredentialExchangeProvider> {
        let token_source = self.token_source().await?;
        let mut sts = StsExchangeClient::load(self.region.clone())
            .await
            .with_duration_seconds(self.duration);
        if let Some(policy) = &self.policy {
            sts = sts.with_policy(policy);
        }

        let mut builder = CredentialExchangeProvider::builder()
            .shared_token_source(token_source)
            .exchange_client(sts);
        if let Some(role_arn) = &self.role_arn {
            builder = builder.role_arn(role_arn);
        }
        if let Some(session_name) = &self.session_name {
            builder = builder.session_name(session_name);
        }

        Ok(builder.build())
    }

    /// Service account key if given, else the metadata server; optionally
    /// used as the source credential of an impersonation chain
    pub async fn token_source(&self) -> Result<Arc<dyn IdentityTokenSource>> {
        match &self.credential_file {
            Some(path) => {
                let key = ServiceAccountKey::from_file(path)
                    .await
                    .with_context(|| format!("Failed to load credential file: {}", path.display()))?;
                let issuer =
                    ServiceAccountKeyIssuer::new(key).context("Invalid service account key")?;
                info!("Using service account key: {}", issuer.client_email());
                self.with_impersonation(issuer)
            }
            None => {
                let metadata = MetadataServer::new();
                info!("Using metadata server: {}", metadata.base_url());
                self.with_impersonation(metadata)
            }
        }
    }

    fn with_impersonation<S>(&self, source: S) -> Result<Arc<dyn IdentityTokenSource>>
    where
        S: TokenIssuer + AccessTokenSource + 'static,
    {
        match &self.impersonate_service_account {
            Some(target) => {
                let impersonated = ImpersonatedServiceAccount::new(Arc::new(source), target)
                    .with_delegates(self.delegates.clone());
                info!(
                    "Impersonating service account: {}",
                    impersonated.target_principal()
                );
                Ok(self.cached(impersonated))
            }
            None => Ok(self.cached(source)),
        }
    }

    fn cached<I: TokenIssuer + 'static>(&self, issuer: I) -> Arc<dyn IdentityTokenSource> {
        Arc::new(CachedTokenSource::new(issuer, &self.audience))
    }
}
