use std::{error::Error, fmt, time::SystemTime};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sts::{
    Client as StsClient,
    error::{ProvideErrorMetadata, SdkError},
};
use aws_smithy_types::error::display::DisplayErrorContext;
use tracing::{debug, info, warn};

use super::SessionCredentials;
use crate::{
    constants::{DEFAULT_AWS_REGION, ENV_AWS_REGION, non_empty_env},
    error::ExchangeError,
    token::IdentityToken,
};

/// Web-identity-federation exchange against a security token service.
#[async_trait]
pub trait TokenExchangeClient: Send + Sync + fmt::Debug {
    async fn exchange(
        &self,
        token: &IdentityToken,
        role_arn: &str,
        session_name: &str,
    ) -> Result<SessionCredentials, ExchangeError>;
}

/// [`TokenExchangeClient`] backed by AWS STS `AssumeRoleWithWebIdentity`
#[derive(Clone)]
pub struct StsExchangeClient {
    client: StsClient,
    duration_seconds: Option<i32>,
    policy: Option<String>,
}

impl fmt::Debug for StsExchangeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsExchangeClient")
            .field(
                "region",
                &self.client.config().region().map(ToString::to_string),
            )
            .field("duration_seconds", &self.duration_seconds)
            .field("policy", &self.policy.is_some())
            .finish()
    }
}

impl StsExchangeClient {
    pub fn new(client: StsClient) -> Self {
        Self {
            client,
            duration_seconds: None,
            policy: None,
        }
    }

    /// Timeouts and retries are taken from `config`.
    pub fn from_conf(config: &SdkConfig) -> Self {
        Self::new(StsClient::new(config))
    }

    /// Builds a client without touching the environment beyond the region.
    /// Priority: explicit region -> AWS_REGION -> DEFAULT_AWS_REGION
    pub fn from_region(region: Option<String>) -> Self {
        let region = region
            .or_else(|| non_empty_env(ENV_AWS_REGION))
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());

        let config = aws_sdk_sts::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .build();

        Self::new(StsClient::from_conf(config))
    }

    /// Load the shared AWS config (env vars, config file, timeouts, retries).
    /// AssumeRoleWithWebIdentity is unsigned, so no AWS credentials are loaded.
    pub async fn load(region: Option<String>) -> Self {
        let loader = aws_config::defaults(BehaviorVersion::latest()).no_credentials();
        let loader = match region {
            Some(region) => loader.region(Region::new(region)),
            None => loader,
        };
        let loaded = loader.load().await;

        let config = match loaded.region() {
            Some(region) => {
                info!("Using region: {}", region);
                loaded
            }
            None => {
                info!(
                    "No region configured, using default {} for STS",
                    DEFAULT_AWS_REGION
                );
                aws_config::defaults(BehaviorVersion::latest())
                    .no_credentials()
                    .region(Region::new(DEFAULT_AWS_REGION))
                    .load()
                    .await
            }
        };

        Self::from_conf(&config)
    }

    /// Requested session lifetime; STS caps it by the role's maximum.
    pub fn with_duration_seconds(mut self, duration_seconds: i32) -> Self {
        self.duration_seconds = Some(duration_seconds);
        self
    }

    /// Inline session policy further restricting the assumed role
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }
}

#[async_trait]
impl TokenExchangeClient for StsExchangeClient {
    async fn exchange(
        &self,
        token: &IdentityToken,
        role_arn: &str,
        session_name: &str,
    ) -> Result<SessionCredentials, ExchangeError> {
        info!("Calling AWS STS AssumeRoleWithWebIdentity");
        debug!("Role ARN: {}", role_arn);
        debug!("Session name: {}", session_name);
        debug!("Duration: {:?} seconds", self.duration_seconds);

        let response = self
            .client
            .assume_role_with_web_identity()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .web_identity_token(token.value())
            .set_duration_seconds(self.duration_seconds)
            .set_policy(self.policy.clone())
            .send()
            .await
            .map_err(|sdk_error| {
                warn!(
                    error = %DisplayErrorContext(&sdk_error),
                    "STS returned an error assuming web identity role"
                );
                into_exchange_error(sdk_error)
            })?;

        let sts_creds = response.credentials().ok_or_else(|| {
            ExchangeError::MalformedResponse("AWS STS returned no credentials".to_string())
        })?;

        let expires_at = SystemTime::try_from(*sts_creds.expiration()).map_err(|e| {
            ExchangeError::MalformedResponse(format!("unrepresentable expiration: {e}"))
        })?;

        Ok(SessionCredentials {
            access_key_id: sts_creds.access_key_id().to_string(),
            secret_access_key: sts_creds.secret_access_key().to_string(),
            session_token: sts_creds.session_token().to_string(),
            expires_at,
        })
    }
}

fn into_exchange_error<E, R>(err: SdkError<E, R>) -> ExchangeError
where
    E: ProvideErrorMetadata + Error + 'static,
    R: fmt::Debug,
{
    match &err {
        SdkError::ServiceError(service) => ExchangeError::Rejected {
            code: service.err().code().map(str::to_string),
            message: service
                .err()
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string()),
        },
        _ => ExchangeError::Dispatch(DisplayErrorContext(&err).to_string()),
    }
}
