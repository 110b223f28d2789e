//! Retry decorator for vendor adapters.

use super::error::ProviderError;
use super::traits::{
    ActivationCommand, ActivationState, ProviderBalance, ProvisionedNumber, SmsProvider,
};
use crate::errors::RetryableError;
use crate::types::{ActivationId, CountryCode, ServiceCode, VendorName};
use backon::{ExponentialBuilder, Retryable};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::debug;

// =============================================================================
// Retry configuration
// =============================================================================

/// Exponential backoff settings for retried vendor calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub factor: f32,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            max_retries: 3,
        }
    }
}

impl RetryConfig {
    /// Create a configuration with the default backoff curve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay before the first retry.
    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Set the upper bound on the delay between attempts.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn with_factor(mut self, factor: f32) -> Self {
        self.factor = factor;
        self
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Build the `backon` strategy described by this configuration.
    pub fn build_strategy(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_retries)
    }
}

// =============================================================================
// Retrying decorator
// =============================================================================

/// Callback invoked before each retry with the error and the upcoming delay.
pub type OnRetryCallback = Arc<dyn Fn(&ProviderError, Duration) + Send + Sync>;

/// Wraps an adapter and retries transient failures of read-path calls.
///
/// Only `get_number` and `get_status` are retried. Mutating calls such as
/// `set_status` and `cancel` go through exactly once so a flaky vendor is
/// never asked twice to change the same activation.
#[derive(Clone)]
pub struct RetryingProvider {
    inner: Arc<dyn SmsProvider>,
    retry_config: RetryConfig,
    on_retry: Option<OnRetryCallback>,
}

impl fmt::Debug for RetryingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingProvider")
            .field("vendor", self.inner.vendor())
            .field("retry_config", &self.retry_config)
            .field("on_retry", &self.on_retry.as_ref().map(|_| "..."))
            .finish()
    }
}

impl RetryingProvider {
    /// Wrap `inner` with the default retry configuration.
    pub fn new(inner: Arc<dyn SmsProvider>) -> Self {
        Self {
            inner,
            retry_config: RetryConfig::default(),
            on_retry: None,
        }
    }

    /// Replace the retry configuration.
    pub fn with_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Observe retries, e.g. to feed vendor failure accounting.
    pub fn with_on_retry(mut self, on_retry: OnRetryCallback) -> Self {
        self.on_retry = Some(on_retry);
        self
    }

    /// The wrapped adapter.
    pub fn inner(&self) -> &Arc<dyn SmsProvider> {
        &self.inner
    }

    /// The active retry configuration.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }
}

#[async_trait::async_trait]
impl SmsProvider for RetryingProvider {
    fn vendor(&self) -> &VendorName {
        self.inner.vendor()
    }

    async fn get_number(
        &self,
        service: &ServiceCode,
        country: &CountryCode,
    ) -> Result<ProvisionedNumber, ProviderError> {
        let on_retry = self.on_retry.clone();
        (|| {
            let inner = self.inner.clone();
            let service = service.clone();
            let country = country.clone();
            async move { inner.get_number(&service, &country).await }
        })
        .retry(self.retry_config.build_strategy())
        .when(|err: &ProviderError| err.is_retryable())
        .notify(move |err, duration| {
            #[cfg(feature = "tracing")]
            debug!(error = %err, delay = ?duration, "Retrying get_number after error");
            if let Some(callback) = &on_retry {
                callback(err, duration);
            }
        })
        .await
    }

    async fn get_status(
        &self,
        activation_id: &ActivationId,
    ) -> Result<ActivationState, ProviderError> {
        let on_retry = self.on_retry.clone();
        (|| {
            let inner = self.inner.clone();
            let activation_id = activation_id.clone();
            async move { inner.get_status(&activation_id).await }
        })
        .retry(self.retry_config.build_strategy())
        .when(|err: &ProviderError| err.is_retryable())
        .notify(move |err, duration| {
            #[cfg(feature = "tracing")]
            debug!(error = %err, delay = ?duration, "Retrying get_status after error");
            if let Some(callback) = &on_retry {
                callback(err, duration);
            }
        })
        .await
    }

    async fn cancel(&self, activation_id: &ActivationId) -> Result<(), ProviderError> {
        self.inner.cancel(activation_id).await
    }

    async fn set_status(
        &self,
        activation_id: &ActivationId,
        command: ActivationCommand,
    ) -> Result<(), ProviderError> {
        self.inner.set_status(activation_id, command).await
    }

    async fn get_balance(&self) -> Result<ProviderBalance, ProviderError> {
        self.inner.get_balance().await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}
