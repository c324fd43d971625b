use std::{
    fmt,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::{
    constants::{ENV_ROLE_ARN, ENV_ROLE_SESSION_NAME, SESSION_NAME_PREFIX, non_empty_env},
    error::ConfigError,
    token::IdentityTokenSource,
};

/// Resolved, immutable provider configuration
#[derive(Clone)]
pub struct ProviderConfig {
    role_arn: String,
    session_name: String,
    token_source: Arc<dyn IdentityTokenSource>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("role_arn", &self.role_arn)
            .field("session_name", &self.session_name)
            .field("token_source", &self.token_source)
            .finish()
    }
}

impl ProviderConfig {
    /// Priority for each value: explicit -> environment -> generated default.
    /// The role ARN has no default and the token source must be explicit.
    pub fn resolve(
        role_arn: Option<String>,
        session_name: Option<String>,
        token_source: Option<Arc<dyn IdentityTokenSource>>,
        now: SystemTime,
    ) -> Result<Self, ConfigError> {
        let role_arn = role_arn
            .filter(|arn| !arn.trim().is_empty())
            .or_else(|| non_empty_env(ENV_ROLE_ARN))
            .ok_or(ConfigError::MissingRoleArn)?;

        let token_source = token_source.ok_or(ConfigError::MissingTokenSource)?;

        let session_name = session_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| non_empty_env(ENV_ROLE_SESSION_NAME))
            .unwrap_or_else(|| default_session_name(now));

        Ok(Self {
            role_arn,
            session_name,
            token_source,
        })
    }

    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn token_source(&self) -> &Arc<dyn IdentityTokenSource> {
        &self.token_source
    }
}

/// `exchange-<unix millis>`
pub fn default_session_name(now: SystemTime) -> String {
    let millis = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{SESSION_NAME_PREFIX}{millis}")
}
