use std::{
    fmt,
    time::{Duration, SystemTime},
};

use aws_smithy_types::{DateTime, date_time::Format};

use crate::constants::PROVIDER_NAME;

pub mod credentials;
pub mod sts;

pub use sts::{StsExchangeClient, TokenExchangeClient};

/// AWS temporary credentials issued by STS
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expires_at: SystemTime,
}

impl SessionCredentials {
    /// Usable for at least `margin` more: `now + margin < expires_at`.
    pub fn is_fresh(&self, now: SystemTime, margin: Duration) -> bool {
        now + margin < self.expires_at
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// RFC 3339 expiration, as written to credential files and process output
    pub fn expiration(&self) -> String {
        DateTime::from(self.expires_at)
            .fmt(Format::DateTime)
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &"** redacted **")
            .field("expires_at", &self.expiration())
            .finish()
    }
}

impl From<SessionCredentials> for aws_credential_types::Credentials {
    fn from(creds: SessionCredentials) -> Self {
        aws_credential_types::Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            Some(creds.session_token),
            Some(creds.expires_at),
            PROVIDER_NAME,
        )
    }
}
