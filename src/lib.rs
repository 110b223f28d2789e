//! # SMS Pool
//!
//! Adaptive SMS vendor routing and virtual phone-number pooling for verification services.
//!
//! This library keeps a pool of vendor-purchased phone numbers ready ahead of
//! demand, hands them out with preheated-first precedence and recycles them
//! through cooldown windows until their reuse budget runs out. Vendor choice
//! is adaptive: each provisioning call goes to the vendor currently winning
//! on cost, speed and success rate, with a circuit breaker and layered
//! fallbacks when vendors degrade.
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`PlatformSelector`] | Scores healthy vendors and picks one per provisioning call |
//! | [`NumberPoolManager`] | Pool lifecycle: acquire, mark used, release, maintenance sweeps |
//! | [`PoolScheduler`] | Drives the sweeps on independent intervals |
//! | [`SmsProvider`] | Contract a vendor adapter implements |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sms_pool::{
//!     InMemoryNumberPoolStore, InMemoryVendorConfigStore, NumberPoolManager,
//!     PlatformSelector, PoolConfig, ProviderRegistry, SelectorConfig, VendorConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Register vendor adapters (your implementations of SmsProvider)
//!     let registry = Arc::new(
//!         ProviderRegistry::new()
//!             .with(Arc::new(SmsActivateAdapter::new("api_key")))
//!             .with(Arc::new(FiveSimAdapter::new("api_key"))),
//!     );
//!
//!     // Vendor routing configuration, ranked by priority
//!     let configs = Arc::new(InMemoryVendorConfigStore::new([
//!         VendorConfig::new("sms-activate", 1),
//!         VendorConfig::new("5sim", 2),
//!     ]));
//!     let selector = Arc::new(PlatformSelector::new(
//!         registry,
//!         configs,
//!         SelectorConfig::default(),
//!     ));
//!
//!     // Pool over a shared store
//!     let store = Arc::new(InMemoryNumberPoolStore::new());
//!     let manager = NumberPoolManager::new(store, selector, PoolConfig::default());
//!
//!     // Preheat a few numbers, then hand one out
//!     let service = "tg".into();
//!     let country = "US".into();
//!     manager.preheat_numbers(&service, &country, 5).await;
//!     if let Some(number) = manager.acquire_number(&service, &country, None).await? {
//!         println!("Reserved {}", number.phone_number);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! PoolScheduler ─── periodic sweeps ───┐
//!                                      ▼
//! NumberPoolManager ── claims/sweeps ──▶ NumberPoolStore
//!         │
//!         ▼ preheating
//! PlatformSelector ── scores, breaker ──▶ VendorConfigStore
//!         │
//!         ▼
//! ProviderRegistry ──▶ SmsProvider   (vendor adapters)
//! ```
//!
//! ## Features
//!
//! - `tracing` - OpenTelemetry tracing instrumentation (enabled by default)
//! - `metrics` - OpenTelemetry counter for pool number reuse

pub mod clock;
pub mod errors;
pub mod metrics;
pub mod pool;
pub mod providers;
pub mod selector;
pub mod types;

// Re-export commonly used types at the crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::RetryableError;
pub use metrics::{NoopPoolMetrics, PoolMetrics};
pub use pool::{
    InMemoryNumberPoolStore, NumberPoolManager, NumberPoolStore, NumberStatus, PoolConfig,
    PoolError, PoolScheduler, PoolStatistics, PooledNumber, SchedulerConfig, SchedulerHandle,
};
pub use providers::{ProviderError, ProviderRegistry, RetryConfig, RetryingProvider, SmsProvider};
pub use selector::{
    InMemoryVendorConfigStore, PlatformSelector, SelectionResult, SelectorConfig, SelectorError,
    VendorConfig, VendorConfigStore,
};
pub use types::{
    ActivationId, CallerId, CountryCode, PhoneNumber, PoolNumberId, ServiceCode, VendorName,
};

#[cfg(feature = "metrics")]
pub use metrics::OtelPoolMetrics;
