use thiserror::Error;

/// Failure of an upstream identity token source.
#[derive(Debug, Error)]
pub enum TokenSourceError {
    /// The ambient environment (e.g. the GCE metadata server) could not be reached.
    #[error("execution environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    #[error("HTTP request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Non-success response; the body is kept verbatim.
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("invalid service account key: {0}")]
    InvalidKey(String),

    #[error("failed to sign assertion")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    /// The source handed out a token that had already expired.
    #[error("identity token already expired")]
    Expired,

    /// `current_token` was called before any token had been issued.
    #[error("no identity token has been issued yet")]
    NotIssued,
}

/// Failure of the downstream web-identity-federation exchange.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// STS rejected the request. Code and message are copied verbatim.
    #[error("{}: {message}", .code.as_deref().unwrap_or("Unknown"))]
    Rejected {
        code: Option<String>,
        message: String,
    },

    /// The request never produced a service response (connect error, timeout, ...).
    #[error("STS request failed: {0}")]
    Dispatch(String),

    #[error("malformed STS response: {0}")]
    MalformedResponse(String),
}

/// Construction-time configuration failure. Cloned on every request once captured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(
        "role ARN is not set; pass it explicitly or set the {} environment variable",
        crate::constants::ENV_ROLE_ARN
    )]
    MissingRoleArn,

    #[error("no identity token source configured")]
    MissingTokenSource,
}

/// Error returned by [`CredentialExchangeProvider`](crate::provider::CredentialExchangeProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("identity token refresh failed")]
    IdentityRefreshFailed(#[source] TokenSourceError),

    #[error("web identity exchange rejected")]
    ExchangeRejected(#[source] ExchangeError),
}

impl ProviderError {
    /// Whether the same error is guaranteed on every later call.
    pub fn is_sticky(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
