use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use aws_smithy_async::time::SharedTimeSource;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    constants::{DEFAULT_HTTP_TIMEOUT, TOKEN_REFRESH_MARGIN},
    error::TokenSourceError,
};

pub mod impersonated;
pub mod metadata;
pub mod service_account;

pub use impersonated::ImpersonatedServiceAccount;
pub use metadata::MetadataServer;
pub use service_account::{ServiceAccountKey, ServiceAccountKeyIssuer};

/// An audience-bound OIDC identity token
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityToken {
    value: String,
    expires_at: SystemTime,
    audience: String,
}

impl IdentityToken {
    pub fn new(
        value: impl Into<String>,
        expires_at: SystemTime,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            expires_at,
            audience: audience.into(),
        }
    }

    /// Wrap a JWT, taking the expiry from its `exp` claim.
    pub fn from_jwt(
        value: impl Into<String>,
        audience: impl Into<String>,
    ) -> Result<Self, TokenSourceError> {
        let value = value.into();
        let expires_at = jwt_expiry(&value)?;
        Ok(Self::new(value, expires_at, audience))
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// True once `now + margin` reaches the expiry.
    pub fn is_expired(&self, now: SystemTime, margin: Duration) -> bool {
        now + margin >= self.expires_at
    }
}

impl fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityToken")
            .field("value", &"** redacted **")
            .field("expires_at", &self.expires_at)
            .field("audience", &self.audience)
            .finish()
    }
}

/// OAuth access token used as the source credential of an impersonation chain
#[derive(Clone)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: SystemTime,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"** redacted **")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Capability consumed by the exchange provider.
#[async_trait]
pub trait IdentityTokenSource: Send + Sync + fmt::Debug {
    /// Audience the source refreshes its current token for
    fn audience(&self) -> &str;

    /// Issue a fresh token for an arbitrary audience, bypassing the cache.
    async fn issue(&self, audience: &str) -> Result<IdentityToken, TokenSourceError>;

    /// Re-issue the current token if it is missing or about to expire. No-op otherwise.
    async fn refresh_if_expired(&self) -> Result<(), TokenSourceError>;

    async fn current_token(&self) -> Result<IdentityToken, TokenSourceError>;
}

/// How a particular variant obtains an ID token.
#[async_trait]
pub trait TokenIssuer: Send + Sync + fmt::Debug {
    async fn issue(&self, audience: &str) -> Result<IdentityToken, TokenSourceError>;
}

#[async_trait]
pub trait AccessTokenSource: Send + Sync + fmt::Debug {
    async fn access_token(&self, scopes: &[&str]) -> Result<AccessToken, TokenSourceError>;
}

/// [`IdentityTokenSource`] that caches the last token of a [`TokenIssuer`].
pub struct CachedTokenSource<I> {
    issuer: I,
    audience: String,
    refresh_margin: Duration,
    time_source: SharedTimeSource,
    token: Mutex<Option<IdentityToken>>,
}

impl<I: TokenIssuer> CachedTokenSource<I> {
    pub fn new(issuer: I, audience: impl Into<String>) -> Self {
        Self {
            issuer,
            audience: audience.into(),
            refresh_margin: TOKEN_REFRESH_MARGIN,
            time_source: SharedTimeSource::default(),
            token: Mutex::new(None),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = time_source;
        self
    }
}

impl<I: fmt::Debug> fmt::Debug for CachedTokenSource<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTokenSource")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("refresh_margin", &self.refresh_margin)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<I: TokenIssuer> IdentityTokenSource for CachedTokenSource<I> {
    fn audience(&self) -> &str {
        &self.audience
    }

    async fn issue(&self, audience: &str) -> Result<IdentityToken, TokenSourceError> {
        self.issuer.issue(audience).await
    }

    async fn refresh_if_expired(&self) -> Result<(), TokenSourceError> {
        let mut cached = self.token.lock().await;
        let now = self.time_source.now();

        if cached
            .as_ref()
            .is_some_and(|token| !token.is_expired(now, self.refresh_margin))
        {
            debug!("Cached identity token is still valid");
            return Ok(());
        }

        debug!(audience = %self.audience, "Issuing new identity token");
        let token = self.issuer.issue(&self.audience).await?;
        *cached = Some(token);
        Ok(())
    }

    async fn current_token(&self) -> Result<IdentityToken, TokenSourceError> {
        self.token
            .lock()
            .await
            .clone()
            .ok_or(TokenSourceError::NotIssued)
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: u64,
}

/// Read the `exp` claim of a JWT without verifying its signature.
pub(crate) fn jwt_expiry(token: &str) -> Result<SystemTime, TokenSourceError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenSourceError::MalformedToken(format!(
            "expected 3 JWT segments, found {}",
            segments.len()
        )));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| TokenSourceError::MalformedToken(format!("payload is not base64url: {e}")))?;

    let claim: ExpiryClaim = serde_json::from_slice(&payload)
        .map_err(|e| TokenSourceError::MalformedToken(format!("missing or invalid exp claim: {e}")))?;

    Ok(UNIX_EPOCH + Duration::from_secs(claim.exp))
}

pub(crate) fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DEFAULT_HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Turn a non-success response into [`TokenSourceError::Status`], keeping the body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, TokenSourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(TokenSourceError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn http_error(url: &str) -> impl FnOnce(reqwest::Error) -> TokenSourceError + '_ {
    move |source| TokenSourceError::Http {
        url: url.to_string(),
        source,
    }
}

pub(crate) fn malformed_response(
    url: &str,
) -> impl FnOnce(reqwest::Error) -> TokenSourceError + '_ {
    move |e| TokenSourceError::MalformedResponse {
        url: url.to_string(),
        reason: e.to_string(),
    }
}
