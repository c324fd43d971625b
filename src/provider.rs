use std::{fmt, sync::Arc, time::Duration};

use aws_credential_types::provider::{self, ProvideCredentials, error::CredentialsError, future};
use aws_smithy_async::time::SharedTimeSource;
use aws_smithy_types::error::display::DisplayErrorContext;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    aws::{SessionCredentials, StsExchangeClient, TokenExchangeClient},
    config::ProviderConfig,
    constants::SESSION_REFRESH_MARGIN,
    error::{ConfigError, ProviderError, TokenSourceError},
    token::{IdentityToken, IdentityTokenSource},
};

#[derive(Debug, Default)]
struct ProviderState {
    cached_token: Option<IdentityToken>,
    cached_session: Option<SessionCredentials>,
}

/// Exchanges Google ID tokens for AWS session credentials on demand.
/// Concurrent callers share a single refresh.
pub struct CredentialExchangeProvider {
    config: Result<ProviderConfig, ConfigError>,
    exchange_client: Arc<dyn TokenExchangeClient>,
    refresh_margin: Duration,
    time_source: SharedTimeSource,
    state: Mutex<ProviderState>,
}

impl fmt::Debug for CredentialExchangeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialExchangeProvider")
            .field("config", &self.config)
            .field("exchange_client", &self.exchange_client)
            .field("refresh_margin", &self.refresh_margin)
            .finish_non_exhaustive()
    }
}

impl CredentialExchangeProvider {
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub fn role_arn(&self) -> Option<&str> {
        self.config.as_ref().ok().map(ProviderConfig::role_arn)
    }

    pub fn session_name(&self) -> Option<&str> {
        self.config.as_ref().ok().map(ProviderConfig::session_name)
    }

    /// Current session credentials, exchanging a new session when needed.
    ///
    /// At most one refresh attempt is made per call. If it fails while the cached
    /// session has not expired yet, the cached session is returned instead.
    pub async fn credentials(&self) -> Result<SessionCredentials, ProviderError> {
        let config = self.config.as_ref().map_err(|err| err.clone())?;

        let mut state = self.state.lock().await;

        let now = self.time_source.now();
        if let Some(session) = state
            .cached_session
            .as_ref()
            .filter(|session| session.is_fresh(now, self.refresh_margin))
        {
            debug!("Using cached AWS session credentials");
            return Ok(session.clone());
        }

        match self.refresh(config, &mut state).await {
            Ok(session) => {
                state.cached_session = Some(session.clone());
                Ok(session)
            }
            Err(err) => {
                let now = self.time_source.now();
                match state
                    .cached_session
                    .as_ref()
                    .filter(|session| !session.is_expired(now))
                {
                    Some(session) => {
                        warn!(
                            error = %DisplayErrorContext(&err),
                            expiration = %session.expiration(),
                            "Refresh failed, returning cached credentials until they expire"
                        );
                        Ok(session.clone())
                    }
                    None => Err(err),
                }
            }
        }
    }

    async fn refresh(
        &self,
        config: &ProviderConfig,
        state: &mut ProviderState,
    ) -> Result<SessionCredentials, ProviderError> {
        let source = config.token_source();

        source
            .refresh_if_expired()
            .await
            .map_err(ProviderError::IdentityRefreshFailed)?;
        let token = source
            .current_token()
            .await
            .map_err(ProviderError::IdentityRefreshFailed)?;

        if token.is_expired(self.time_source.now(), Duration::ZERO) {
            return Err(ProviderError::IdentityRefreshFailed(
                TokenSourceError::Expired,
            ));
        }
        state.cached_token = Some(token.clone());

        let session = self
            .exchange_client
            .exchange(&token, config.role_arn(), config.session_name())
            .await
            .map_err(ProviderError::ExchangeRejected)?;

        info!(
            role_arn = %config.role_arn(),
            expiration = %session.expiration(),
            "Obtained AWS session credentials"
        );
        Ok(session)
    }

    async fn provide(&self) -> provider::Result {
        self.credentials()
            .await
            .map(Into::into)
            .map_err(|err| match err {
                ProviderError::Configuration(_) => CredentialsError::invalid_configuration(err),
                _ => CredentialsError::provider_error(err),
            })
    }
}

impl ProvideCredentials for CredentialExchangeProvider {
    fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
    where
        Self: 'a,
    {
        future::ProvideCredentials::new(self.provide())
    }
}

/// Builder for [`CredentialExchangeProvider`].
///
/// `build` never fails: a configuration problem is captured and returned by
/// every later credentials request.
#[derive(Debug, Default)]
pub struct Builder {
    role_arn: Option<String>,
    session_name: Option<String>,
    token_source: Option<Arc<dyn IdentityTokenSource>>,
    exchange_client: Option<Arc<dyn TokenExchangeClient>>,
    region: Option<String>,
    refresh_margin: Option<Duration>,
    time_source: Option<SharedTimeSource>,
}

impl Builder {
    /// Falls back to `AWS_ROLE_ARN`
    pub fn role_arn(mut self, role_arn: impl Into<String>) -> Self {
        self.role_arn = Some(role_arn.into());
        self
    }

    /// Falls back to `AWS_ROLE_SESSION_NAME`, then to `exchange-<unix millis>`
    pub fn session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = Some(session_name.into());
        self
    }

    pub fn token_source(self, token_source: impl IdentityTokenSource + 'static) -> Self {
        self.shared_token_source(Arc::new(token_source))
    }

    pub fn shared_token_source(mut self, token_source: Arc<dyn IdentityTokenSource>) -> Self {
        self.token_source = Some(token_source);
        self
    }

    pub fn exchange_client(self, client: impl TokenExchangeClient + 'static) -> Self {
        self.shared_exchange_client(Arc::new(client))
    }

    pub fn shared_exchange_client(mut self, client: Arc<dyn TokenExchangeClient>) -> Self {
        self.exchange_client = Some(client);
        self
    }

    pub fn sts_client(self, client: aws_sdk_sts::Client) -> Self {
        self.exchange_client(StsExchangeClient::new(client))
    }

    /// STS region used when no exchange client is supplied
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = Some(margin);
        self
    }

    pub fn time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = Some(time_source);
        self
    }

    pub fn build(self) -> CredentialExchangeProvider {
        let time_source = self.time_source.unwrap_or_default();

        let config = ProviderConfig::resolve(
            self.role_arn,
            self.session_name,
            self.token_source,
            time_source.now(),
        );
        match &config {
            Ok(config) => debug!(
                role_arn = %config.role_arn(),
                session_name = %config.session_name(),
                "Configured credential exchange provider"
            ),
            Err(err) => warn!(error = %err, "Credential exchange provider is misconfigured"),
        }

        let region = self.region;
        let exchange_client = self
            .exchange_client
            .unwrap_or_else(|| Arc::new(StsExchangeClient::from_region(region)));

        CredentialExchangeProvider {
            config,
            exchange_client,
            refresh_margin: self.refresh_margin.unwrap_or(SESSION_REFRESH_MARGIN),
            time_source,
            state: Mutex::new(ProviderState::default()),
        }
    }
}
