//! Adaptive SMS vendor routing.
//!
//! The [`PlatformSelector`] picks the vendor for each provisioning call from
//! the enabled entries in a [`VendorConfigStore`]. With smart routing on,
//! healthy vendors are ranked by a weighted score over observed cost, speed
//! and success rate; with it off, static priority order decides. A breaker
//! takes a vendor out of rotation after consecutive failures, and one
//! success, a passing probe or a manual reset brings it back.

pub(crate) mod config;
pub(crate) mod performance;
pub(crate) mod scoring;
pub(crate) mod structure;

pub use config::{
    ConfigStoreError, HealthStatus, InMemoryVendorConfigStore, ScoringWeights, VendorAggregates,
    VendorConfig, VendorConfigStore,
};
pub use performance::{InMemoryPerformanceTracker, PerformanceStats, VendorPerformance};
pub use scoring::ScoreBreakdown;
pub use structure::{
    EMERGENCY_FALLBACK_LEVEL, PlatformSelector, SelectionResult, SelectorConfig,
    SelectorConfigBuilder, SelectorError,
};
