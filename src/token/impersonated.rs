use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    AccessTokenSource, IdentityToken, TokenIssuer, default_http_client, ensure_success,
    http_error, malformed_response,
};
use crate::{
    constants::{CLOUD_PLATFORM_SCOPE, DEFAULT_IAM_CREDENTIALS_BASE_URL},
    error::TokenSourceError,
};

const SERVICE_ACCOUNT_RESOURCE_PREFIX: &str = "projects/-/serviceAccounts/";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateIdTokenRequest<'a> {
    audience: &'a str,
    include_email: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    delegates: Vec<String>,
}

#[derive(Deserialize)]
struct GenerateIdTokenResponse {
    token: String,
}

/// Derived-from-impersonation-chain token issuer
#[derive(Debug, Clone)]
pub struct ImpersonatedServiceAccount {
    source: Arc<dyn AccessTokenSource>,
    target_principal: String,
    delegates: Vec<String>,
    base_url: String,
    http: reqwest::Client,
}

impl ImpersonatedServiceAccount {
    /// `source` authenticates the `generateIdToken` call made on behalf of `target_principal`.
    pub fn new(source: Arc<dyn AccessTokenSource>, target_principal: impl Into<String>) -> Self {
        Self {
            source,
            target_principal: target_principal.into(),
            delegates: Vec::new(),
            base_url: DEFAULT_IAM_CREDENTIALS_BASE_URL.to_string(),
            http: default_http_client(),
        }
    }

    /// Intermediate service accounts of the delegation chain, in order.
    pub fn with_delegates(mut self, delegates: impl IntoIterator<Item = String>) -> Self {
        self.delegates = delegates.into_iter().collect();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn target_principal(&self) -> &str {
        &self.target_principal
    }

    fn delegate_resources(&self) -> Vec<String> {
        self.delegates
            .iter()
            .map(|delegate| {
                if delegate.starts_with(SERVICE_ACCOUNT_RESOURCE_PREFIX) {
                    delegate.clone()
                } else {
                    format!("{SERVICE_ACCOUNT_RESOURCE_PREFIX}{delegate}")
                }
            })
            .collect()
    }
}

#[async_trait]
impl TokenIssuer for ImpersonatedServiceAccount {
    async fn issue(&self, audience: &str) -> Result<IdentityToken, TokenSourceError> {
        let source_token = self.source.access_token(&[CLOUD_PLATFORM_SCOPE]).await?;

        debug!(
            target_principal = %self.target_principal,
            delegates = self.delegates.len(),
            audience = %audience,
            "Requesting impersonated ID token"
        );

        let url = format!(
            "{}/v1/{SERVICE_ACCOUNT_RESOURCE_PREFIX}{}:generateIdToken",
            self.base_url, self.target_principal
        );
        let request = GenerateIdTokenRequest {
            audience,
            include_email: true,
            delegates: self.delegate_resources(),
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&source_token.value)
            .json(&request)
            .send()
            .await
            .map_err(http_error(&url))?;
        let response = ensure_success(response, &url).await?;

        let body: GenerateIdTokenResponse =
            response.json().await.map_err(malformed_response(&url))?;

        IdentityToken::from_jwt(body.token, audience)
    }
}
