//! Pool metrics emission.
//!
//! The pool emits one business counter: a number handed out from the pool
//! instead of a fresh vendor purchase. The sink is a trait so embedders can
//! wire their own pipeline; [`NoopPoolMetrics`] is the default.

use crate::types::VendorName;

/// Sink for pool-level counters.
pub trait PoolMetrics: Send + Sync {
    /// A pooled number was reserved, saving a vendor purchase.
    fn record_pool_reuse(&self, vendor: &VendorName);
}

/// Metrics sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPoolMetrics;

impl PoolMetrics for NoopPoolMetrics {
    fn record_pool_reuse(&self, _vendor: &VendorName) {}
}

#[cfg(feature = "metrics")]
mod otel {
    use super::PoolMetrics;
    use crate::types::VendorName;
    use opentelemetry::KeyValue;
    use opentelemetry::metrics::{Counter, Meter};

    /// OpenTelemetry-backed pool metrics.
    #[derive(Debug, Clone)]
    pub struct OtelPoolMetrics {
        pool_reuse: Counter<u64>,
    }

    impl OtelPoolMetrics {
        /// Register the pool counters on the given meter.
        pub fn new(meter: &Meter) -> Self {
            Self {
                pool_reuse: meter
                    .u64_counter("sms_pool.number_reused")
                    .with_description("Pooled numbers handed out instead of fresh vendor purchases")
                    .build(),
            }
        }
    }

    impl PoolMetrics for OtelPoolMetrics {
        fn record_pool_reuse(&self, vendor: &VendorName) {
            self.pool_reuse
                .add(1, &[KeyValue::new("vendor", vendor.to_string())]);
        }
    }
}

#[cfg(feature = "metrics")]
pub use otel::OtelPoolMetrics;
