//! Vendor routing configuration and its persistence contract.

use crate::types::VendorName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Mutex;
use thiserror::Error;

// =============================================================================
// Scoring weights
// =============================================================================

/// Relative importance of each scoring dimension.
///
/// Weights are expected to sum to 1.0; the selector multiplies each component
/// score by its weight and sums the results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the cost component.
    pub cost: f64,
    /// Weight of the response speed component.
    pub speed: f64,
    /// Weight of the success rate component.
    pub success_rate: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            cost: 0.4,
            speed: 0.3,
            success_rate: 0.3,
        }
    }
}

// =============================================================================
// Health status
// =============================================================================

/// Persisted health verdict for a vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Vendor is serving requests.
    #[default]
    Healthy,
    /// Vendor tripped the failure breaker or failed a probe.
    Unhealthy,
}

impl Display for HealthStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        };
        write!(f, "{s}")
    }
}

// =============================================================================
// Vendor configuration
// =============================================================================

/// Aggregated counters persisted alongside a vendor's configuration.
///
/// These survive process restarts and exist for operator dashboards; live
/// routing decisions read the in-memory tracker instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VendorAggregates {
    /// Total calls routed to the vendor.
    pub total_requests: u64,
    /// Calls that succeeded.
    pub total_success: u64,
    /// Calls that failed.
    pub total_failures: u64,
    /// Mean response time rounded to whole seconds.
    pub avg_response_seconds: u64,
    /// Success rate at the last persistence, 0..=100.
    pub last_success_rate: f64,
    /// Last persisted health verdict.
    pub health_status: HealthStatus,
    /// When health was last evaluated.
    pub last_health_check: Option<DateTime<Utc>>,
}

/// Per-vendor routing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorConfig {
    /// Vendor this configuration applies to.
    pub vendor: VendorName,
    /// Disabled vendors are never considered for selection.
    pub enabled: bool,
    /// Priority rank; lower values are preferred.
    pub priority: i32,
    /// Vendor-specific scoring weights, falling back to the selector default.
    pub weights: Option<ScoringWeights>,
    /// Optional vendor-side rate limit, informational.
    pub max_requests_per_minute: Option<u32>,
    /// Optional minimum balance under which the vendor should be paused.
    pub min_balance: Option<f64>,
    /// Persisted aggregate counters.
    #[serde(default)]
    pub aggregates: VendorAggregates,
}

impl VendorConfig {
    /// Create an enabled configuration with the given priority rank.
    pub fn new(vendor: impl Into<VendorName>, priority: i32) -> Self {
        Self {
            vendor: vendor.into(),
            enabled: true,
            priority,
            weights: None,
            max_requests_per_minute: None,
            min_balance: None,
            aggregates: VendorAggregates::default(),
        }
    }

    /// Mark the vendor disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Override the scoring weights for this vendor.
    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = Some(weights);
        self
    }
}

// =============================================================================
// Persistence contract
// =============================================================================

/// Error raised by a configuration store backend.
#[derive(Debug, Clone, Error)]
pub enum ConfigStoreError {
    /// Backend failed to read or write.
    #[error("vendor config storage error: {0}")]
    Storage(String),
}

/// Persistence for vendor routing configuration.
///
/// Implementations back this with whatever the deployment uses for
/// configuration; the crate ships [`InMemoryVendorConfigStore`] for tests and
/// single-process setups.
#[async_trait::async_trait]
pub trait VendorConfigStore: Send + Sync {
    /// Enabled vendor configurations in ascending priority order.
    async fn load_enabled(&self) -> Result<Vec<VendorConfig>, ConfigStoreError>;

    /// Persist aggregate counters for a vendor.
    ///
    /// Persisting for an unknown vendor is a no-op, not an error; the vendor
    /// may have been removed from configuration while stats were in flight.
    async fn update_aggregates(
        &self,
        vendor: &VendorName,
        aggregates: &VendorAggregates,
    ) -> Result<(), ConfigStoreError>;

    /// Persist the health verdict for a vendor.
    async fn update_health_status(
        &self,
        vendor: &VendorName,
        status: HealthStatus,
    ) -> Result<(), ConfigStoreError>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local [`VendorConfigStore`].
#[derive(Debug, Default)]
pub struct InMemoryVendorConfigStore {
    configs: Mutex<HashMap<VendorName, VendorConfig>>,
}

impl InMemoryVendorConfigStore {
    /// Create a store holding the given configurations.
    pub fn new(configs: impl IntoIterator<Item = VendorConfig>) -> Self {
        Self {
            configs: Mutex::new(
                configs
                    .into_iter()
                    .map(|config| (config.vendor.clone(), config))
                    .collect(),
            ),
        }
    }

    /// Insert or replace a vendor's configuration.
    pub fn insert(&self, config: VendorConfig) {
        self.lock().insert(config.vendor.clone(), config);
    }

    /// Current configuration for a vendor, if present.
    pub fn get(&self, vendor: &VendorName) -> Option<VendorConfig> {
        self.lock().get(vendor).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<VendorName, VendorConfig>> {
        self.configs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl VendorConfigStore for InMemoryVendorConfigStore {
    async fn load_enabled(&self) -> Result<Vec<VendorConfig>, ConfigStoreError> {
        let mut enabled: Vec<VendorConfig> = self
            .lock()
            .values()
            .filter(|config| config.enabled)
            .cloned()
            .collect();
        enabled.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.vendor.cmp(&b.vendor)));
        Ok(enabled)
    }

    async fn update_aggregates(
        &self,
        vendor: &VendorName,
        aggregates: &VendorAggregates,
    ) -> Result<(), ConfigStoreError> {
        if let Some(config) = self.lock().get_mut(vendor) {
            config.aggregates = aggregates.clone();
        }
        Ok(())
    }

    async fn update_health_status(
        &self,
        vendor: &VendorName,
        status: HealthStatus,
    ) -> Result<(), ConfigStoreError> {
        if let Some(config) = self.lock().get_mut(vendor) {
            config.aggregates.health_status = status;
        }
        Ok(())
    }
}
