//! Wraps an inner provider that yields `ExpiringCredential`s behind an
//! `ExpiringValue`, so many concurrent callers share one refresh.
//!
//! Grounded the same way as `ExpiringValue` itself: the `aws-config` IMDS
//! `TokenResolver` pattern of "one cache, many callers, at most one
//! in-flight refresh task" generalized from a token to arbitrary
//! `ExpiringCredential`-yielding providers.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;

use crate::credential::expiring::{ExpiringValue, ExpiringValueError};
use crate::credential::{AwsCredentials, CredentialsError, ExpiringCredential, ProvideAwsCredentials};

/// Anything that can produce a fresh, expiring credential. Implemented by
/// `LoginCredentialProvider`; any other provider with a real expiration can
/// be wrapped the same way.
#[async_trait]
pub trait ProvideExpiringCredentials: Send + Sync {
    async fn expiring_credentials(&self) -> Result<ExpiringCredential, CredentialsError>;
}

/// Default background-refresh threshold: start refreshing 2 minutes before
/// expiry while still serving the cached credential (mirrors the IMDS
/// token resolver's refresh buffer).
pub const DEFAULT_REFRESH_THRESHOLD_SECS: i64 = 120;

pub struct RotatingCredentialProvider<P> {
    inner: std::sync::Arc<P>,
    cache: ExpiringValue<AwsCredentials>,
}

impl<P: ProvideExpiringCredentials + 'static> RotatingCredentialProvider<P> {
    pub fn new(inner: P) -> Self {
        Self::with_threshold_secs(inner, DEFAULT_REFRESH_THRESHOLD_SECS)
    }

    pub fn with_threshold_secs(inner: P, threshold_secs: i64) -> Self {
        RotatingCredentialProvider {
            inner: std::sync::Arc::new(inner),
            cache: ExpiringValue::new(ChronoDuration::seconds(threshold_secs)),
        }
    }

    /// Drops the cached credential, forcing the next call to refresh.
    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }
}

#[async_trait]
impl<P: ProvideExpiringCredentials + 'static> ProvideAwsCredentials for RotatingCredentialProvider<P> {
    async fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
        let inner = self.inner.clone();
        self.cache
            .get(move || async move {
                let expiring = inner
                    .expiring_credentials()
                    .await
                    .map_err(ExpiringValueError::new)?;
                Ok((expiring.credentials, expiring.expiration))
            })
            .await
            .map_err(|err| CredentialsError::Other(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProvideExpiringCredentials for CountingProvider {
        async fn expiring_credentials(&self) -> Result<ExpiringCredential, CredentialsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExpiringCredential {
                credentials: AwsCredentials::new("AKID", "SECRET", None, None),
                expiration: Utc::now() + chrono::Duration::seconds(3600),
            })
        }
    }

    #[tokio::test]
    async fn fifty_concurrent_callers_trigger_one_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(RotatingCredentialProvider::with_threshold_secs(
            CountingProvider { calls: calls.clone() },
            120,
        ));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let provider = provider.clone();
            handles.push(tokio::spawn(async move { provider.credentials().await }));
        }
        for h in handles {
            let creds = h.await.unwrap().unwrap();
            assert_eq!(creds.aws_access_key_id(), "AKID");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
