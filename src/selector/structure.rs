//! Adaptive vendor selection.

use super::config::{
    ConfigStoreError, HealthStatus, ScoringWeights, VendorAggregates, VendorConfig,
    VendorConfigStore,
};
use super::performance::{InMemoryPerformanceTracker, PerformanceStats, VendorPerformance};
use super::scoring::ScoreBreakdown;
use crate::clock::{Clock, SystemClock};
use crate::errors::RetryableError;
use crate::providers::{ProviderError, ProviderRegistry, SmsProvider};
use crate::types::{CountryCode, ServiceCode, VendorName};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "tracing")]
use opentelemetry::trace::Status;
#[cfg(feature = "tracing")]
use tracing::Span;
#[cfg(feature = "tracing")]
use tracing::{debug, error, info, warn};
#[cfg(feature = "tracing")]
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Fallback level reported when selection recovers from an internal fault.
pub const EMERGENCY_FALLBACK_LEVEL: u32 = 99;

// =============================================================================
// Configuration
// =============================================================================

/// Tuning for vendor selection.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Score vendors on observed performance instead of static priority.
    pub smart_routing: bool,
    /// Vendor used when selection fails internally.
    pub default_vendor: VendorName,
    /// Weights applied to vendors that carry none of their own.
    pub default_weights: ScoringWeights,
    /// Consecutive failures before a vendor is marked unhealthy.
    pub failure_threshold: u32,
    /// Budget for a single active health probe.
    pub health_check_timeout: Duration,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            smart_routing: true,
            default_vendor: VendorName::from("sms-activate"),
            default_weights: ScoringWeights::default(),
            failure_threshold: 3,
            health_check_timeout: Duration::from_secs(10),
        }
    }
}

impl SelectorConfig {
    /// Create a new builder for SelectorConfig.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sms_pool::selector::SelectorConfig;
    /// use std::time::Duration;
    ///
    /// let config = SelectorConfig::builder()
    ///     .smart_routing(false)
    ///     .default_vendor("5sim")
    ///     .health_check_timeout(Duration::from_secs(5))
    ///     .build();
    ///
    /// assert!(!config.smart_routing);
    /// assert_eq!(config.default_vendor.as_str(), "5sim");
    /// ```
    pub fn builder() -> SelectorConfigBuilder {
        SelectorConfigBuilder::default()
    }
}

/// Builder for SelectorConfig.
#[derive(Debug, Clone, Default)]
pub struct SelectorConfigBuilder {
    config: SelectorConfig,
}

impl SelectorConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable performance-based routing.
    ///
    /// Default: enabled
    pub fn smart_routing(mut self, enabled: bool) -> Self {
        self.config.smart_routing = enabled;
        self
    }

    /// Set the vendor used by the emergency fallback path.
    ///
    /// Default: `sms-activate`
    pub fn default_vendor(mut self, vendor: impl Into<VendorName>) -> Self {
        self.config.default_vendor = vendor.into();
        self
    }

    /// Set the weights applied to vendors without their own.
    pub fn default_weights(mut self, weights: ScoringWeights) -> Self {
        self.config.default_weights = weights;
        self
    }

    /// Set the consecutive failure count that trips a vendor unhealthy.
    ///
    /// Default: 3
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the budget for a single active health probe.
    ///
    /// Default: 10 seconds
    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.config.health_check_timeout = timeout;
        self
    }

    /// Build the SelectorConfig.
    pub fn build(self) -> SelectorConfig {
        self.config
    }
}

// =============================================================================
// Selection result and errors
// =============================================================================

/// Outcome of a selection round.
#[derive(Clone)]
pub struct SelectionResult {
    /// Selected vendor.
    pub vendor: VendorName,
    /// Registered adapter for the selected vendor.
    pub adapter: Arc<dyn SmsProvider>,
    /// Weighted score the vendor won with; 0.0 on fallback paths.
    pub score: f64,
    /// Human-readable explanation of the decision.
    pub reason: String,
    /// How degraded the decision was: 0 for a normal pick, the enabled vendor
    /// count when every vendor was unhealthy, [`EMERGENCY_FALLBACK_LEVEL`]
    /// when selection itself failed.
    pub fallback_level: u32,
}

impl fmt::Debug for SelectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionResult")
            .field("vendor", &self.vendor)
            .field("score", &self.score)
            .field("reason", &self.reason)
            .field("fallback_level", &self.fallback_level)
            .finish()
    }
}

/// Errors selection surfaces to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// Configuration holds no enabled vendors.
    #[error("no enabled SMS vendors are configured")]
    NoVendorsConfigured,

    /// A vendor was named that has no registered adapter.
    #[error("vendor {vendor} has no registered adapter")]
    UnknownVendor {
        /// The vendor that could not be resolved.
        vendor: VendorName,
    },
}

impl RetryableError for SelectorError {
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Internal selection failure, split by how it is handled.
enum SelectFailure {
    /// Configuration problem the caller must fix; surfaced as-is.
    Config(SelectorError),
    /// Internal fault; selection recovers through the emergency fallback.
    Internal(String),
}

impl From<ConfigStoreError> for SelectFailure {
    fn from(err: ConfigStoreError) -> Self {
        SelectFailure::Internal(err.to_string())
    }
}

// =============================================================================
// PlatformSelector
// =============================================================================

/// Chooses the SMS vendor for the next provisioning call.
///
/// Selection reads enabled vendors from the [`VendorConfigStore`], drops the
/// ones the performance tracker considers unhealthy and, with smart routing
/// enabled, ranks the rest by a weighted score over cost, speed and success
/// rate. Every degraded path still returns a usable vendor as long as one
/// adapter is registered; only an empty configuration or an unresolvable
/// default vendor surface an error.
pub struct PlatformSelector {
    registry: Arc<ProviderRegistry>,
    config_store: Arc<dyn VendorConfigStore>,
    stats: Arc<dyn PerformanceStats>,
    clock: Arc<dyn Clock>,
    config: SelectorConfig,
}

impl fmt::Debug for PlatformSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformSelector")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl PlatformSelector {
    /// Create a selector with its own in-memory performance tracker.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        config_store: Arc<dyn VendorConfigStore>,
        config: SelectorConfig,
    ) -> Self {
        let stats = Arc::new(InMemoryPerformanceTracker::new(config.failure_threshold));
        Self::with_stats(registry, config_store, stats, config)
    }

    /// Create a selector sharing an externally owned performance tracker.
    pub fn with_stats(
        registry: Arc<ProviderRegistry>,
        config_store: Arc<dyn VendorConfigStore>,
        stats: Arc<dyn PerformanceStats>,
        config: SelectorConfig,
    ) -> Self {
        Self::with_clock(registry, config_store, stats, Arc::new(SystemClock), config)
    }

    /// Create a selector reading time from the given clock.
    pub fn with_clock(
        registry: Arc<ProviderRegistry>,
        config_store: Arc<dyn VendorConfigStore>,
        stats: Arc<dyn PerformanceStats>,
        clock: Arc<dyn Clock>,
        config: SelectorConfig,
    ) -> Self {
        let selector = Self {
            registry,
            config_store,
            stats,
            clock,
            config,
        };
        for vendor in selector.registry.names() {
            selector.stats.ensure(&vendor);
        }
        #[cfg(feature = "tracing")]
        info!(
            vendors = selector.registry.len(),
            smart_routing = selector.config.smart_routing,
            "Initialized SMS vendor selector"
        );
        selector
    }

    /// The active configuration.
    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// The adapter registry selection resolves against.
    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Select the vendor for the next provisioning call.
    ///
    /// Internal faults (a failing config store, a configured vendor missing
    /// from the registry) degrade to the default vendor instead of failing
    /// the call; see [`SelectionResult::fallback_level`].
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "PlatformSelector::select_best_platform",
            skip_all,
            fields(service = %service, country = %country, vendor = tracing::field::Empty)
        )
    )]
    pub async fn select_best_platform(
        &self,
        service: &ServiceCode,
        country: &CountryCode,
    ) -> Result<SelectionResult, SelectorError> {
        match self.try_select().await {
            Ok(result) => {
                #[cfg(feature = "tracing")]
                {
                    Span::current()
                        .record("vendor", result.vendor.as_str())
                        .set_status(Status::Ok);
                    info!(
                        vendor = %result.vendor,
                        score = result.score,
                        fallback_level = result.fallback_level,
                        reason = %result.reason,
                        "Vendor selected"
                    );
                }
                Ok(result)
            }
            Err(SelectFailure::Config(err)) => Err(err),
            Err(SelectFailure::Internal(_reason)) => {
                #[cfg(feature = "tracing")]
                error!(error = %_reason, "Vendor selection failed, using emergency fallback");
                self.emergency_fallback()
            }
        }
    }

    async fn try_select(&self) -> Result<SelectionResult, SelectFailure> {
        let configs = self.config_store.load_enabled().await?;
        if configs.is_empty() {
            return Err(SelectFailure::Config(SelectorError::NoVendorsConfigured));
        }

        let healthy: Vec<&VendorConfig> = configs
            .iter()
            .filter(|config| self.stats.is_healthy(&config.vendor))
            .collect();

        if healthy.is_empty() {
            // Refusing to pick would stall provisioning entirely, so the
            // highest priority vendor gets one more chance.
            let first = &configs[0];
            let adapter = self.adapter_for(&first.vendor)?;
            #[cfg(feature = "tracing")]
            warn!(vendor = %first.vendor, "All vendors unhealthy, using highest priority");
            return Ok(SelectionResult {
                vendor: first.vendor.clone(),
                adapter,
                score: 0.0,
                reason: "all vendors unhealthy, forced fallback to highest priority".to_string(),
                fallback_level: configs.len() as u32,
            });
        }

        if !self.config.smart_routing {
            let first = healthy[0];
            let adapter = self.adapter_for(&first.vendor)?;
            return Ok(SelectionResult {
                vendor: first.vendor.clone(),
                adapter,
                score: 0.0,
                reason: "selected by priority".to_string(),
                fallback_level: 0,
            });
        }

        let mut best: Option<(f64, &VendorConfig, ScoreBreakdown)> = None;
        for config in healthy {
            let performance = self
                .stats
                .snapshot(&config.vendor)
                .unwrap_or_else(|| VendorPerformance::new(config.vendor.clone()));
            let breakdown = ScoreBreakdown::from_performance(&performance);
            let weights = config.weights.unwrap_or(self.config.default_weights);
            let total = breakdown.total(&weights);
            #[cfg(feature = "tracing")]
            debug!(vendor = %config.vendor, score = total, components = %breakdown, "Scored vendor");

            // Strictly greater keeps the earlier (higher priority) vendor on ties.
            let better = match &best {
                Some((best_total, _, _)) => total > *best_total,
                None => true,
            };
            if better {
                best = Some((total, config, breakdown));
            }
        }

        let (score, chosen, breakdown) =
            best.ok_or_else(|| SelectFailure::Internal("scored vendor list was empty".into()))?;
        let adapter = self.adapter_for(&chosen.vendor)?;
        Ok(SelectionResult {
            vendor: chosen.vendor.clone(),
            adapter,
            score,
            reason: format!("selected by score ({breakdown})"),
            fallback_level: 0,
        })
    }

    fn adapter_for(&self, vendor: &VendorName) -> Result<Arc<dyn SmsProvider>, SelectFailure> {
        self.registry.get(vendor).ok_or_else(|| {
            SelectFailure::Internal(format!("vendor {vendor} has no registered adapter"))
        })
    }

    fn emergency_fallback(&self) -> Result<SelectionResult, SelectorError> {
        let vendor = self.config.default_vendor.clone();
        let adapter = self
            .registry
            .get(&vendor)
            .ok_or_else(|| SelectorError::UnknownVendor {
                vendor: vendor.clone(),
            })?;
        #[cfg(feature = "tracing")]
        warn!(vendor = %vendor, "Falling back to default vendor");
        Ok(SelectionResult {
            vendor,
            adapter,
            score: 0.0,
            reason: "emergency fallback to default vendor".to_string(),
            fallback_level: EMERGENCY_FALLBACK_LEVEL,
        })
    }

    /// Record a successful vendor call.
    ///
    /// Updates the live tracker synchronously and persists the derived
    /// aggregates in the background, so this must run inside a Tokio runtime.
    pub fn record_success(&self, vendor: &VendorName, response_time: Duration, cost: f64) {
        let stats = self
            .stats
            .record_success(vendor, response_time.as_secs_f64() * 1000.0, cost);
        #[cfg(feature = "tracing")]
        debug!(
            vendor = %vendor,
            success_rate = stats.success_rate,
            avg_response_ms = stats.average_response_time_ms,
            "Recorded vendor success"
        );
        self.persist_aggregates(stats);
    }

    /// Record a failed vendor call.
    ///
    /// Updates the live tracker synchronously and persists the derived
    /// aggregates in the background, so this must run inside a Tokio runtime.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn record_failure(&self, vendor: &VendorName, error: &ProviderError) {
        let stats = self.stats.record_failure(vendor);
        #[cfg(feature = "tracing")]
        if stats.is_healthy {
            warn!(
                vendor = %vendor,
                error = %error,
                consecutive_failures = stats.consecutive_failures,
                "Recorded vendor failure"
            );
        } else {
            error!(
                vendor = %vendor,
                error = %error,
                consecutive_failures = stats.consecutive_failures,
                "Vendor is unhealthy after repeated failures"
            );
        }
        self.persist_aggregates(stats);
    }

    /// Force a vendor back into rotation and persist the healthy verdict.
    pub async fn reset_provider_health(&self, vendor: &VendorName) {
        if self.stats.reset(vendor).is_some() {
            #[cfg(feature = "tracing")]
            info!(vendor = %vendor, "Vendor health manually reset");
        }
        if let Err(_err) = self
            .config_store
            .update_health_status(vendor, HealthStatus::Healthy)
            .await
        {
            #[cfg(feature = "tracing")]
            warn!(vendor = %vendor, error = %_err, "Failed to persist vendor health status");
        }
    }

    /// Probe every registered vendor and apply the verdicts.
    ///
    /// Probes run sequentially, each bounded by the configured timeout. A
    /// passing probe restores a tripped vendor; a timeout counts as a failed
    /// probe.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "PlatformSelector::perform_health_checks", skip_all)
    )]
    pub async fn perform_health_checks(&self) -> HashMap<VendorName, bool> {
        let mut results = HashMap::new();
        let mut vendors = self.registry.names();
        vendors.sort();

        for vendor in vendors {
            let Some(adapter) = self.registry.get(&vendor) else {
                continue;
            };
            let probe = tokio::time::timeout(
                self.config.health_check_timeout,
                adapter.health_check(),
            );
            let healthy = match probe.await {
                Ok(verdict) => verdict,
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    warn!(vendor = %vendor, "Health probe timed out");
                    false
                }
            };
            self.stats.apply_probe(&vendor, healthy);

            let status = if healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };
            if let Err(_err) = self.config_store.update_health_status(&vendor, status).await {
                #[cfg(feature = "tracing")]
                warn!(vendor = %vendor, error = %_err, "Failed to persist vendor health status");
            }

            #[cfg(feature = "tracing")]
            debug!(vendor = %vendor, healthy, "Health probe finished");
            results.insert(vendor, healthy);
        }

        #[cfg(feature = "tracing")]
        info!(
            healthy = results.values().filter(|healthy| **healthy).count(),
            total = results.len(),
            "Vendor health checks finished"
        );
        results
    }

    /// Live performance snapshots for every tracked vendor.
    pub fn provider_stats(&self) -> Vec<VendorPerformance> {
        self.stats.snapshots()
    }

    /// Live performance snapshot for one vendor.
    pub fn provider_stat(&self, vendor: &VendorName) -> Option<VendorPerformance> {
        self.stats.snapshot(vendor)
    }

    fn persist_aggregates(&self, stats: VendorPerformance) {
        let aggregates = VendorAggregates {
            total_requests: stats.total_requests,
            total_success: stats.success_count,
            total_failures: stats.failure_count,
            avg_response_seconds: (stats.average_response_time_ms / 1000.0).round() as u64,
            last_success_rate: stats.success_rate,
            health_status: if stats.is_healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            last_health_check: Some(self.clock.now()),
        };
        let store = self.config_store.clone();
        let vendor = stats.vendor;
        tokio::spawn(async move {
            if let Err(_err) = store.update_aggregates(&vendor, &aggregates).await {
                #[cfg(feature = "tracing")]
                warn!(vendor = %vendor, error = %_err, "Failed to persist vendor aggregates");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        ActivationCommand, ActivationState, ProviderBalance, ProvisionedNumber,
    };
    use crate::selector::config::InMemoryVendorConfigStore;
    use crate::types::{ActivationId, PhoneNumber};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct TestProvider {
        vendor: VendorName,
        healthy: AtomicBool,
    }

    impl TestProvider {
        fn new(vendor: &str) -> Arc<Self> {
            Arc::new(Self {
                vendor: VendorName::from(vendor),
                healthy: AtomicBool::new(true),
            })
        }
    }

    #[async_trait::async_trait]
    impl SmsProvider for TestProvider {
        fn vendor(&self) -> &VendorName {
            &self.vendor
        }

        async fn get_number(
            &self,
            _service: &ServiceCode,
            _country: &CountryCode,
        ) -> Result<ProvisionedNumber, ProviderError> {
            Ok(ProvisionedNumber {
                activation_id: ActivationId::from("act-1"),
                phone_number: PhoneNumber::from("79000000001"),
                cost: 0.10,
            })
        }

        async fn get_status(
            &self,
            _activation_id: &ActivationId,
        ) -> Result<ActivationState, ProviderError> {
            Err(ProviderError::request_failed(self.vendor.clone(), "stub"))
        }

        async fn cancel(&self, _activation_id: &ActivationId) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn set_status(
            &self,
            _activation_id: &ActivationId,
            _command: ActivationCommand,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn get_balance(&self) -> Result<ProviderBalance, ProviderError> {
            Ok(ProviderBalance {
                balance: 12.0,
                currency: "USD".to_string(),
            })
        }

        async fn health_check(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    struct FailingConfigStore;

    #[async_trait::async_trait]
    impl VendorConfigStore for FailingConfigStore {
        async fn load_enabled(&self) -> Result<Vec<VendorConfig>, ConfigStoreError> {
            Err(ConfigStoreError::Storage("database unreachable".into()))
        }

        async fn update_aggregates(
            &self,
            _vendor: &VendorName,
            _aggregates: &VendorAggregates,
        ) -> Result<(), ConfigStoreError> {
            Ok(())
        }

        async fn update_health_status(
            &self,
            _vendor: &VendorName,
            _status: HealthStatus,
        ) -> Result<(), ConfigStoreError> {
            Ok(())
        }
    }

    fn registry_of(vendors: &[&str]) -> Arc<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();
        for vendor in vendors {
            registry.register(TestProvider::new(vendor));
        }
        Arc::new(registry)
    }

    fn two_vendor_store() -> Arc<InMemoryVendorConfigStore> {
        Arc::new(InMemoryVendorConfigStore::new([
            VendorConfig::new("sms-activate", 1),
            VendorConfig::new("5sim", 2),
        ]))
    }

    fn service() -> ServiceCode {
        ServiceCode::from("tg")
    }

    fn country() -> CountryCode {
        CountryCode::from("US")
    }

    async fn wait_for(mut predicate: impl FnMut() -> bool) {
        for _ in 0..200 {
            if predicate() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition was not met in time");
    }

    #[tokio::test]
    async fn test_fresh_vendors_tie_breaks_by_priority() {
        let selector = PlatformSelector::new(
            registry_of(&["sms-activate", "5sim"]),
            two_vendor_store(),
            SelectorConfig::default(),
        );

        let result = selector
            .select_best_platform(&service(), &country())
            .await
            .unwrap();

        assert_eq!(result.vendor.as_str(), "sms-activate");
        assert_eq!(result.fallback_level, 0);
        assert!(result.reason.starts_with("selected by score"));
        assert!((result.score - 65.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_better_performance_beats_priority() {
        let selector = PlatformSelector::new(
            registry_of(&["sms-activate", "5sim"]),
            two_vendor_store(),
            SelectorConfig::default(),
        );

        // Cheap and fast observed calls push 5sim past the fresh default.
        let secondary = VendorName::from("5sim");
        selector.record_success(&secondary, Duration::from_millis(1000), 0.05);

        let result = selector
            .select_best_platform(&service(), &country())
            .await
            .unwrap();

        assert_eq!(result.vendor.as_str(), "5sim");
        assert!(result.score > 65.0);
    }

    #[tokio::test]
    async fn test_breaker_diverts_to_next_vendor() {
        let selector = PlatformSelector::new(
            registry_of(&["sms-activate", "5sim"]),
            two_vendor_store(),
            SelectorConfig::default(),
        );

        let primary = VendorName::from("sms-activate");
        let err = ProviderError::request_failed(primary.clone(), "boom");
        for _ in 0..3 {
            selector.record_failure(&primary, &err);
        }

        let result = selector
            .select_best_platform(&service(), &country())
            .await
            .unwrap();

        assert_eq!(result.vendor.as_str(), "5sim");
        assert_eq!(result.fallback_level, 0);
    }

    #[tokio::test]
    async fn test_all_unhealthy_forces_highest_priority() {
        let selector = PlatformSelector::new(
            registry_of(&["sms-activate", "5sim"]),
            two_vendor_store(),
            SelectorConfig::default(),
        );

        for vendor in ["sms-activate", "5sim"] {
            let vendor = VendorName::from(vendor);
            let err = ProviderError::request_failed(vendor.clone(), "boom");
            for _ in 0..3 {
                selector.record_failure(&vendor, &err);
            }
        }

        let result = selector
            .select_best_platform(&service(), &country())
            .await
            .unwrap();

        assert_eq!(result.vendor.as_str(), "sms-activate");
        assert_eq!(result.score, 0.0);
        assert_eq!(result.fallback_level, 2);
        assert!(result.reason.contains("all vendors unhealthy"));
    }

    #[tokio::test]
    async fn test_no_enabled_vendors_is_an_error() {
        let selector = PlatformSelector::new(
            registry_of(&["sms-activate"]),
            Arc::new(InMemoryVendorConfigStore::default()),
            SelectorConfig::default(),
        );

        let err = selector
            .select_best_platform(&service(), &country())
            .await
            .unwrap_err();

        assert_eq!(err, SelectorError::NoVendorsConfigured);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_store_failure_recovers_with_emergency_fallback() {
        let selector = PlatformSelector::new(
            registry_of(&["sms-activate", "5sim"]),
            Arc::new(FailingConfigStore),
            SelectorConfig::default(),
        );

        let result = selector
            .select_best_platform(&service(), &country())
            .await
            .unwrap();

        assert_eq!(result.vendor.as_str(), "sms-activate");
        assert_eq!(result.score, 0.0);
        assert_eq!(result.fallback_level, EMERGENCY_FALLBACK_LEVEL);
        assert!(result.reason.contains("emergency fallback"));
    }

    #[tokio::test]
    async fn test_unregistered_default_vendor_is_an_error() {
        let selector = PlatformSelector::new(
            registry_of(&["5sim"]),
            Arc::new(FailingConfigStore),
            SelectorConfig::builder().default_vendor("ghost").build(),
        );

        let err = selector
            .select_best_platform(&service(), &country())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SelectorError::UnknownVendor {
                vendor: VendorName::from("ghost"),
            }
        );
    }

    #[tokio::test]
    async fn test_smart_routing_disabled_picks_first_healthy() {
        let selector = PlatformSelector::new(
            registry_of(&["sms-activate", "5sim"]),
            two_vendor_store(),
            SelectorConfig::builder().smart_routing(false).build(),
        );

        // Strong stats for 5sim must not matter with smart routing off.
        selector.record_success(&VendorName::from("5sim"), Duration::from_millis(800), 0.05);

        let result = selector
            .select_best_platform(&service(), &country())
            .await
            .unwrap();

        assert_eq!(result.vendor.as_str(), "sms-activate");
        assert_eq!(result.reason, "selected by priority");
    }

    #[tokio::test]
    async fn test_passing_probe_restores_tripped_vendor() {
        let primary = TestProvider::new("sms-activate");
        let registry = Arc::new(ProviderRegistry::new().with(primary.clone()));
        let selector = PlatformSelector::new(
            registry,
            Arc::new(InMemoryVendorConfigStore::new([VendorConfig::new(
                "sms-activate",
                1,
            )])),
            SelectorConfig::default(),
        );

        let vendor = VendorName::from("sms-activate");
        let err = ProviderError::request_failed(vendor.clone(), "boom");
        for _ in 0..3 {
            selector.record_failure(&vendor, &err);
        }
        assert!(!selector.provider_stat(&vendor).unwrap().is_healthy);

        let verdicts = selector.perform_health_checks().await;
        assert_eq!(verdicts.get(&vendor), Some(&true));

        let stats = selector.provider_stat(&vendor).unwrap();
        assert!(stats.is_healthy);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_failing_probe_trips_vendor() {
        let primary = TestProvider::new("sms-activate");
        primary.healthy.store(false, Ordering::SeqCst);
        let registry = Arc::new(ProviderRegistry::new().with(primary));
        let selector = PlatformSelector::new(
            registry,
            Arc::new(InMemoryVendorConfigStore::new([VendorConfig::new(
                "sms-activate",
                1,
            )])),
            SelectorConfig::default(),
        );

        let vendor = VendorName::from("sms-activate");
        let verdicts = selector.perform_health_checks().await;

        assert_eq!(verdicts.get(&vendor), Some(&false));
        assert!(!selector.provider_stat(&vendor).unwrap().is_healthy);
    }

    #[tokio::test]
    async fn test_reset_provider_health() {
        let store = two_vendor_store();
        let selector = PlatformSelector::new(
            registry_of(&["sms-activate", "5sim"]),
            store.clone(),
            SelectorConfig::default(),
        );

        let vendor = VendorName::from("sms-activate");
        let err = ProviderError::request_failed(vendor.clone(), "boom");
        for _ in 0..3 {
            selector.record_failure(&vendor, &err);
        }
        wait_for(|| {
            store
                .get(&vendor)
                .map(|config| config.aggregates.total_requests == 3)
                .unwrap_or(false)
        })
        .await;
        let persisted = store.get(&vendor).unwrap().aggregates;
        assert_eq!(persisted.health_status, HealthStatus::Unhealthy);

        selector.reset_provider_health(&vendor).await;

        assert!(selector.provider_stat(&vendor).unwrap().is_healthy);
        let config = store.get(&vendor).unwrap();
        assert_eq!(config.aggregates.health_status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_success_persists_aggregates_in_background() {
        let store = two_vendor_store();
        let selector = PlatformSelector::new(
            registry_of(&["sms-activate", "5sim"]),
            store.clone(),
            SelectorConfig::default(),
        );

        let vendor = VendorName::from("sms-activate");
        selector.record_success(&vendor, Duration::from_millis(2500), 0.08);

        wait_for(|| {
            store
                .get(&vendor)
                .map(|config| config.aggregates.total_requests == 1)
                .unwrap_or(false)
        })
        .await;

        let aggregates = store.get(&vendor).unwrap().aggregates;
        assert_eq!(aggregates.total_success, 1);
        assert_eq!(aggregates.avg_response_seconds, 3);
        assert_eq!(aggregates.last_success_rate, 100.0);
        assert_eq!(aggregates.health_status, HealthStatus::Healthy);
        assert!(aggregates.last_health_check.is_some());
    }
}
