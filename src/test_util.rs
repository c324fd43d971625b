use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use aws_smithy_async::time::{SharedTimeSource, TimeSource};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::json;

use crate::{
    aws::{SessionCredentials, sts::TokenExchangeClient},
    error::{ExchangeError, TokenSourceError},
    token::{IdentityToken, IdentityTokenSource},
};

/// 2026-10-17T00:00:00Z
pub const START_SECS: u64 = 1_792_195_200;

/// `AssumeRoleWithWebIdentity` response expiring one hour after [`START_SECS`]
pub const STS_SUCCESS_XML: &str = r#"<AssumeRoleWithWebIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleWithWebIdentityResult>
    <SubjectFromWebIdentityToken>112233445566778899</SubjectFromWebIdentityToken>
    <Audience>https://sts.amazonaws.com</Audience>
    <AssumedRoleUser>
      <Arn>arn:aws:sts::123456789012:assumed-role/reader/test-session</Arn>
      <AssumedRoleId>AROAEXAMPLE:test-session</AssumedRoleId>
    </AssumedRoleUser>
    <Credentials>
      <AccessKeyId>ASIAEXAMPLE</AccessKeyId>
      <SecretAccessKey>wJalrXUtnFEMI</SecretAccessKey>
      <SessionToken>FwoGZXIvYXdzE</SessionToken>
      <Expiration>2026-10-17T01:00:00Z</Expiration>
    </Credentials>
    <Provider>accounts.google.com</Provider>
  </AssumeRoleWithWebIdentityResult>
  <ResponseMetadata>
    <RequestId>c6104cbe-af31-11e0-8154-cbc7ccf896c7</RequestId>
  </ResponseMetadata>
</AssumeRoleWithWebIdentityResponse>"#;

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<SystemTime>>);

impl ManualClock {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(
            UNIX_EPOCH + Duration::from_secs(START_SECS),
        )))
    }

    pub fn now(&self) -> SystemTime {
        *self.0.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }

    pub fn shared(&self) -> SharedTimeSource {
        SharedTimeSource::new(self.clone())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> SystemTime {
        ManualClock::now(self)
    }
}

/// Unsigned JWT carrying `exp` and `aud` claims.
pub fn fake_jwt(exp: u64, aud: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": "RS256", "typ": "JWT"}).to_string());
    let payload = URL_SAFE_NO_PAD.encode(
        json!({
            "iss": "https://accounts.google.com",
            "aud": aud,
            "sub": "112233445566778899",
            "exp": exp,
        })
        .to_string(),
    );
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

/// Token source handing out `id-token-N`, valid for `lifetime` from the clock's now.
#[derive(Debug)]
pub struct FakeTokenSource {
    clock: ManualClock,
    lifetime: Duration,
    current: tokio::sync::Mutex<Option<IdentityToken>>,
    pub refreshes: AtomicUsize,
    pub fail: Mutex<Option<String>>,
}

impl FakeTokenSource {
    pub fn new(clock: &ManualClock, lifetime: Duration) -> Self {
        Self {
            clock: clock.clone(),
            lifetime,
            current: tokio::sync::Mutex::new(None),
            refreshes: AtomicUsize::new(0),
            fail: Mutex::new(None),
        }
    }

    pub fn fail_with(&self, message: &str) {
        *self.fail.lock().unwrap() = Some(message.to_string());
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityTokenSource for FakeTokenSource {
    fn audience(&self) -> &str {
        "https://sts.amazonaws.com"
    }

    async fn issue(&self, audience: &str) -> Result<IdentityToken, TokenSourceError> {
        if let Some(message) = self.fail.lock().unwrap().clone() {
            return Err(TokenSourceError::EnvironmentUnavailable(message));
        }
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(IdentityToken::new(
            format!("id-token-{n}"),
            self.clock.now() + self.lifetime,
            audience,
        ))
    }

    async fn refresh_if_expired(&self) -> Result<(), TokenSourceError> {
        let mut current = self.current.lock().await;
        let now = self.clock.now();
        if current
            .as_ref()
            .is_some_and(|token| !token.is_expired(now, Duration::ZERO))
        {
            return Ok(());
        }
        *current = Some(self.issue(self.audience()).await?);
        Ok(())
    }

    async fn current_token(&self) -> Result<IdentityToken, TokenSourceError> {
        self.current
            .lock()
            .await
            .clone()
            .ok_or(TokenSourceError::NotIssued)
    }
}

/// Exchange client handing out `ASIA-N` sessions, with optional delay and failure.
#[derive(Debug)]
pub struct FakeExchangeClient {
    clock: ManualClock,
    lifetime: Duration,
    delay: Duration,
    calls: AtomicUsize,
    fail: Mutex<Option<(String, String)>>,
    seen: Mutex<Vec<(String, String, String)>>,
}

impl FakeExchangeClient {
    pub fn new(clock: &ManualClock, lifetime: Duration) -> Self {
        Self {
            clock: clock.clone(),
            lifetime,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            fail: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reject_with(&self, code: &str, message: &str) {
        *self.fail.lock().unwrap() = Some((code.to_string(), message.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (token, role ARN, session name) of every exchange attempt
    pub fn requests(&self) -> Vec<(String, String, String)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenExchangeClient for FakeExchangeClient {
    async fn exchange(
        &self,
        token: &IdentityToken,
        role_arn: &str,
        session_name: &str,
    ) -> Result<SessionCredentials, ExchangeError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push((
            token.value().to_string(),
            role_arn.to_string(),
            session_name.to_string(),
        ));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some((code, message)) = self.fail.lock().unwrap().clone() {
            return Err(ExchangeError::Rejected {
                code: Some(code),
                message,
            });
        }

        Ok(SessionCredentials {
            access_key_id: format!("ASIA-{n}"),
            secret_access_key: format!("secret-{n}"),
            session_token: format!("session-{n}"),
            expires_at: self.clock.now() + self.lifetime,
        })
    }
}
