//! Provider retry — bounded re-attempts with a per-attempt timeout.
//!
//! Transient failures (network, timeout, rate limit, 5xx) are retried up to
//! `max_retries` more times. Authentication and other client errors are
//! returned immediately.

use async_trait::async_trait;
use flowlm_core::error::ProviderError;
use flowlm_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Wraps a provider and retries transient failures.
pub struct RetryProvider {
    inner: Arc<dyn flowlm_core::Provider>,
    max_retries: u32,
    timeout: Duration,
    backoff: Duration,
}

impl RetryProvider {
    pub fn new(inner: Arc<dyn flowlm_core::Provider>, max_retries: u32, timeout: Duration) -> Self {
        Self {
            inner,
            max_retries,
            timeout,
            backoff: Duration::from_millis(500),
        }
    }

    /// Base delay between attempts; doubles on each retry.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Whether a failure is worth another attempt.
pub fn is_transient(error: &ProviderError) -> bool {
    match error {
        ProviderError::Network(_)
        | ProviderError::Timeout(_)
        | ProviderError::RateLimited { .. } => true,
        ProviderError::ApiError { status_code, .. } => *status_code >= 500,
        _ => false,
    }
}

#[async_trait]
impl flowlm_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let attempts = self.max_retries + 1;
        let mut delay = self.backoff;

        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(self.timeout, self.inner.complete(request.clone()))
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::Timeout(format!(
                        "{} did not respond within {:?}",
                        self.inner.name(),
                        self.timeout
                    )))
                });

            match outcome {
                Ok(response) => {
                    if attempt > 1 {
                        info!(
                            provider = %self.inner.name(),
                            attempt,
                            "Provider succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(e) if attempt < attempts && is_transient(&e) => {
                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        total = attempts,
                        error = %e,
                        "Transient provider failure, retrying"
                    );
                    let wait = match &e {
                        ProviderError::RateLimited { retry_after_secs } => {
                            delay.max(Duration::from_secs(*retry_after_secs))
                        }
                        _ => delay,
                    };
                    tokio::time::sleep(wait).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }

        Err(ProviderError::NotConfigured(
            "Retry loop finished without an attempt".into(),
        ))
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        self.inner.embed(request).await
    }
}
