use std::time::Duration;

use async_trait::async_trait;
use aws_smithy_async::time::SharedTimeSource;
use serde::Deserialize;
use tracing::debug;

use super::{
    AccessToken, AccessTokenSource, IdentityToken, TokenIssuer, default_http_client,
    ensure_success, malformed_response,
};
use crate::{
    constants::{DEFAULT_METADATA_BASE_URL, ENV_METADATA_HOST, non_empty_env},
    error::TokenSourceError,
};

const SERVICE_ACCOUNT_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default";

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Derived-from-instance-metadata token issuer
#[derive(Debug, Clone)]
pub struct MetadataServer {
    base_url: String,
    http: reqwest::Client,
    time_source: SharedTimeSource,
}

impl Default for MetadataServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataServer {
    /// Uses `GCE_METADATA_HOST` when set, the well-known metadata host otherwise.
    pub fn new() -> Self {
        let base_url = non_empty_env(ENV_METADATA_HOST)
            .map(|host| format!("http://{host}"))
            .unwrap_or_else(|| DEFAULT_METADATA_BASE_URL.to_string());

        Self {
            base_url,
            http: default_http_client(),
            time_source: SharedTimeSource::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(
        &self,
        resource: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, TokenSourceError> {
        let url = format!("{}{SERVICE_ACCOUNT_PATH}/{resource}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(query)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    TokenSourceError::EnvironmentUnavailable(format!(
                        "metadata server at {} is not reachable: {e}",
                        self.base_url
                    ))
                } else {
                    TokenSourceError::Http {
                        url: url.clone(),
                        source: e,
                    }
                }
            })?;

        ensure_success(response, &url).await
    }
}

#[async_trait]
impl TokenIssuer for MetadataServer {
    async fn issue(&self, audience: &str) -> Result<IdentityToken, TokenSourceError> {
        debug!(audience = %audience, "Requesting ID token from metadata server");

        let response = self
            .get("identity", &[("audience", audience), ("format", "full")])
            .await?;
        let body = response
            .text()
            .await
            .map_err(malformed_response(&self.base_url))?;

        IdentityToken::from_jwt(body.trim(), audience)
    }
}

#[async_trait]
impl AccessTokenSource for MetadataServer {
    async fn access_token(&self, scopes: &[&str]) -> Result<AccessToken, TokenSourceError> {
        debug!("Requesting access token from metadata server");

        let scopes = scopes.join(",");
        let issued_at = self.time_source.now();
        let response = self.get("token", &[("scopes", scopes.as_str())]).await?;
        let body: MetadataTokenResponse = response
            .json()
            .await
            .map_err(malformed_response(&self.base_url))?;

        Ok(AccessToken {
            value: body.access_token,
            expires_at: issued_at + Duration::from_secs(body.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{ManualClock, START_SECS, fake_jwt};
    use serde_json::json;
    use serial_test::serial;
    use std::{env, time::UNIX_EPOCH};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    #[test]
    #[serial]
    fn test_base_url_from_env() {
        let original = env::var(ENV_METADATA_HOST).ok();

        unsafe {
            env::set_var(ENV_METADATA_HOST, "169.254.169.254");
        }
        assert_eq!(MetadataServer::new().base_url(), "http://169.254.169.254");

        unsafe {
            env::remove_var(ENV_METADATA_HOST);
        }
        assert_eq!(MetadataServer::new().base_url(), DEFAULT_METADATA_BASE_URL);

        unsafe {
            if let Some(val) = original {
                env::set_var(ENV_METADATA_HOST, val);
            }
        }
    }

    #[tokio::test]
    async fn test_issue_reads_identity_endpoint() {
        let server = MockServer::start().await;
        let jwt = fake_jwt(START_SECS + 3600, "https://sts.amazonaws.com");

        Mock::given(method("GET"))
            .and(path(format!("{SERVICE_ACCOUNT_PATH}/identity")))
            .and(header("Metadata-Flavor", "Google"))
            .and(query_param("audience", "https://sts.amazonaws.com"))
            .and(query_param("format", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{jwt}\n")))
            .expect(1)
            .mount(&server)
            .await;

        let metadata = MetadataServer::new().with_base_url(server.uri());
        let token = metadata.issue("https://sts.amazonaws.com").await.unwrap();

        assert_eq!(token.value(), jwt);
        assert_eq!(
            token.expires_at(),
            UNIX_EPOCH + Duration::from_secs(START_SECS + 3600)
        );
    }

    #[tokio::test]
    async fn test_issue_outside_gcp_is_environment_unavailable() {
        // Reserved port on localhost; nothing listens there
        let metadata = MetadataServer::new().with_base_url("http://127.0.0.1:9");
        let err = metadata.issue("https://sts.amazonaws.com").await.unwrap_err();
        assert!(
            matches!(err, TokenSourceError::EnvironmentUnavailable(_)),
            "unexpected error: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_issue_error_status_is_kept() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("service account not found"))
            .mount(&server)
            .await;

        let metadata = MetadataServer::new().with_base_url(server.uri());
        let err = metadata.issue("https://sts.amazonaws.com").await.unwrap_err();
        assert!(matches!(
            err,
            TokenSourceError::Status { status: 404, ref body, .. } if body == "service account not found"
        ));
    }

    #[tokio::test]
    async fn test_access_token_from_token_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{SERVICE_ACCOUNT_PATH}/token")))
            .and(query_param(
                "scopes",
                "https://www.googleapis.com/auth/cloud-platform",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.metadata",
                "expires_in": 1800,
                "token_type": "Bearer",
            })))
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let metadata = MetadataServer::new()
            .with_base_url(server.uri())
            .with_time_source(clock.shared());
        let token = metadata
            .access_token(&["https://www.googleapis.com/auth/cloud-platform"])
            .await
            .unwrap();

        assert_eq!(token.value, "ya29.metadata");
        assert_eq!(token.expires_at, clock.now() + Duration::from_secs(1800));
    }
}
