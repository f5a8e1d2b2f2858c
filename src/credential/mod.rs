//! Credential model and the abstract provider trait.
//!
//! `AwsCredentials` and its `credentials_are_expired` buffer are kept from
//! the teacher almost verbatim; `ProvideAwsCredentials`, `CredentialsError`,
//! and `non_empty_env_var` are authored fresh here since the teacher's
//! retrieved files reference them without defining them (the teacher repo's
//! full original carried them in a sibling file this retrieval pack didn't
//! include).

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

pub mod config;
pub mod environment;
pub mod expiring;
pub mod login;
pub mod rotating;
pub mod static_provider;

pub use environment::EnvironmentProvider;
pub use expiring::{ExpiringValue, ExpiringValueError};
pub use login::LoginCredentialProvider;
pub use rotating::RotatingCredentialProvider;
pub use static_provider::StaticProvider;

/// AWS API access credentials: access key, secret key, optional session
/// token (for temporary/federated credentials), optional expiry, and any
/// claims attached by a federated login flow.
#[derive(Clone, Deserialize, Default)]
pub struct AwsCredentials {
    #[serde(rename = "AccessKeyId")]
    pub(crate) key: String,
    #[serde(rename = "SecretAccessKey")]
    pub(crate) secret: String,
    #[serde(rename = "SessionToken", alias = "Token")]
    pub(crate) token: Option<String>,
    #[serde(rename = "Expiration")]
    pub(crate) expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    claims: BTreeMap<String, String>,
}

impl AwsCredentials {
    pub fn new<K, S>(
        key: K,
        secret: S,
        token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> AwsCredentials
    where
        K: Into<String>,
        S: Into<String>,
    {
        AwsCredentials {
            key: key.into(),
            secret: secret.into(),
            token,
            expires_at,
            claims: BTreeMap::new(),
        }
    }

    pub fn aws_access_key_id(&self) -> &str {
        &self.key
    }

    pub fn aws_secret_access_key(&self) -> &str {
        &self.secret
    }

    pub fn expires_at(&self) -> &Option<DateTime<Utc>> {
        &self.expires_at
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// True when key and secret are both empty, signaling an anonymous
    /// (unsigned) request — e.g. public S3 GETs.
    pub fn is_anonymous(&self) -> bool {
        self.key.is_empty() && self.secret.is_empty() && self.token.is_none()
    }

    /// 20-second buffer to avoid a caller sitting on credentials until they
    /// expire mid-request.
    pub(crate) fn credentials_are_expired(&self) -> bool {
        match self.expires_at {
            Some(ref e) => *e < Utc::now() + ChronoDuration::seconds(20),
            None => false,
        }
    }

    pub fn claims(&self) -> &BTreeMap<String, String> {
        &self.claims
    }

    pub fn claims_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.claims
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("key", &self.key)
            .field("secret", &"**********")
            .field("token", &self.token.as_ref().map(|_| "**********"))
            .field("expires_at", &self.expires_at)
            .field("claims", &self.claims)
            .finish()
    }
}

/// `AwsCredentials` that carries a concrete expiration the cache can reason
/// about (as opposed to `AwsCredentials::expires_at` being an `Option` that
/// static/environment credentials simply leave unset).
#[derive(Clone, Debug)]
pub struct ExpiringCredential {
    pub credentials: AwsCredentials,
    pub expiration: DateTime<Utc>,
}

/// The closed error taxonomy for credential acquisition/refresh failures
/// (spec §7's `CredentialsFailed` kinds).
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialsError {
    TokenLoadFailed(String),
    TokenParseFailed(String),
    TokenRefreshFailed(String),
    ProfileNotFound(String),
    ConfigFileNotFound(String),
    LoginSessionMissing,
    HttpRequestFailed { status: u16, code: String, message: String },
    Other(String),
}

impl CredentialsError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        CredentialsError::Other(message.into())
    }
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CredentialsError::TokenLoadFailed(m) => write!(f, "failed to load token file: {}", m),
            CredentialsError::TokenParseFailed(m) => write!(f, "failed to parse token file: {}", m),
            CredentialsError::TokenRefreshFailed(m) => write!(f, "token refresh failed: {}", m),
            CredentialsError::ProfileNotFound(p) => write!(f, "profile not found: {}", p),
            CredentialsError::ConfigFileNotFound(p) => write!(f, "config file not found: {}", p),
            CredentialsError::LoginSessionMissing => {
                write!(f, "login_session is missing from the selected profile")
            }
            CredentialsError::HttpRequestFailed { status, code, message } => write!(
                f,
                "token endpoint returned {} {}: {}",
                status, code, message
            ),
            CredentialsError::Other(m) => write!(f, "{}", m),
        }
    }
}

impl StdError for CredentialsError {}

/// Abstract credential source. `async-trait` keeps this object-safe
/// (`Arc<dyn ProvideAwsCredentials + Send + Sync>`), matching how the
/// teacher's service client held its provider.
#[async_trait]
pub trait ProvideAwsCredentials {
    async fn credentials(&self) -> Result<AwsCredentials, CredentialsError>;
}

#[async_trait]
impl<P: ProvideAwsCredentials + Send + Sync> ProvideAwsCredentials for std::sync::Arc<P> {
    async fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
        (**self).credentials().await
    }
}

/// Reads an environment variable, treating an empty value the same as an
/// absent one (mirrors botocore's handling of blank env credentials).
pub(crate) fn non_empty_env_var(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_credentials_detected() {
        assert!(AwsCredentials::default().is_anonymous());
        assert!(!AwsCredentials::new("k", "s", None, None).is_anonymous());
    }

    #[test]
    fn debug_redacts_secret_and_token() {
        let creds = AwsCredentials::new("AKID", "supersecret", Some("tok".into()), None);
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("supersecret"));
        assert!(!debug.contains("tok\""));
        assert!(debug.contains("AKID"));
    }
}
