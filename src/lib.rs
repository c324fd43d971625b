//! Exchange Google Cloud OIDC identity tokens for AWS STS session credentials.
//!
//! [`CredentialExchangeProvider`] caches the session and implements the AWS SDK's
//! `ProvideCredentials`, so it can be plugged into any SDK client.

pub mod aws;
pub mod cli;
pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod provider;
pub mod token;

#[cfg(test)]
mod test_util;

pub use aws::{SessionCredentials, StsExchangeClient, TokenExchangeClient};
pub use error::{ConfigError, ExchangeError, ProviderError, TokenSourceError};
pub use provider::CredentialExchangeProvider;
pub use token::{CachedTokenSource, IdentityToken, IdentityTokenSource};
