use std::{fmt, path::Path, time::Duration};

use async_trait::async_trait;
use aws_smithy_async::time::SharedTimeSource;
use aws_smithy_types::DateTime;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use super::{
    AccessToken, AccessTokenSource, IdentityToken, TokenIssuer, default_http_client,
    ensure_success, http_error, malformed_response,
};
use crate::{
    constants::{ASSERTION_LIFETIME_SECS, JWT_BEARER_GRANT_TYPE},
    error::TokenSourceError,
};

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The subset of a Google service account JSON key file needed to sign assertions
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, TokenSourceError> {
        serde_json::from_str(json)
            .map_err(|e| TokenSourceError::InvalidKey(format!("failed to parse key file: {e}")))
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TokenSourceError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).await.map_err(|e| {
            TokenSourceError::InvalidKey(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_audience: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

#[derive(Deserialize)]
struct IdTokenResponse {
    id_token: String,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Signed-by-service-account-key token issuer
pub struct ServiceAccountKeyIssuer {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    http: reqwest::Client,
    time_source: SharedTimeSource,
}

impl fmt::Debug for ServiceAccountKeyIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKeyIssuer")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKeyIssuer {
    /// Fails if the key's private key is not a valid RSA PEM.
    pub fn new(key: ServiceAccountKey) -> Result<Self, TokenSourceError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| TokenSourceError::InvalidKey(format!("failed to parse PEM RSA key: {e}")))?;

        Ok(Self {
            key,
            encoding_key,
            http: default_http_client(),
            time_source: SharedTimeSource::default(),
        })
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_time_source(mut self, time_source: SharedTimeSource) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn sign_assertion(
        &self,
        target_audience: Option<&str>,
        scope: Option<String>,
    ) -> Result<String, TokenSourceError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key.private_key_id.clone());

        let now = DateTime::from(self.time_source.now()).secs();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            sub: &self.key.client_email,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS as i64,
            target_audience,
            scope,
        };

        Ok(encode(&header, &claims, &self.encoding_key)?)
    }

    async fn post_assertion(&self, assertion: &str) -> Result<reqwest::Response, TokenSourceError> {
        let url = self.key.token_uri.as_str();
        let response = self
            .http
            .post(url)
            .form(&[("grant_type", JWT_BEARER_GRANT_TYPE), ("assertion", assertion)])
            .send()
            .await
            .map_err(http_error(url))?;

        ensure_success(response, url).await
    }
}

#[async_trait]
impl TokenIssuer for ServiceAccountKeyIssuer {
    async fn issue(&self, audience: &str) -> Result<IdentityToken, TokenSourceError> {
        debug!(
            client_email = %self.key.client_email,
            audience = %audience,
            "Requesting ID token with service account key"
        );

        let assertion = self.sign_assertion(Some(audience), None)?;
        let response = self.post_assertion(&assertion).await?;
        let body: IdTokenResponse = response
            .json()
            .await
            .map_err(malformed_response(&self.key.token_uri))?;

        IdentityToken::from_jwt(body.id_token, audience)
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountKeyIssuer {
    async fn access_token(&self, scopes: &[&str]) -> Result<AccessToken, TokenSourceError> {
        debug!(
            client_email = %self.key.client_email,
            "Requesting access token with service account key"
        );

        let assertion = self.sign_assertion(None, Some(scopes.join(" ")))?;
        let issued_at = self.time_source.now();
        let response = self.post_assertion(&assertion).await?;
        let body: AccessTokenResponse = response
            .json()
            .await
            .map_err(malformed_response(&self.key.token_uri))?;

        Ok(AccessToken {
            value: body.access_token,
            expires_at: issued_at + Duration::from_secs(body.expires_in),
        })
    }
}
