//! Live per-vendor performance tracking.
//!
//! The tracker keeps incremental counters and means for every vendor the
//! selector routes to, and trips a vendor unhealthy after a run of
//! consecutive failures. It is the data source for scoring; the persisted
//! aggregates in the config store are derived from these snapshots.

use crate::clock::{Clock, SystemClock};
use crate::types::VendorName;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

#[cfg(feature = "tracing")]
use tracing::{info, warn};

// =============================================================================
// Snapshot
// =============================================================================

/// Point-in-time performance counters for one vendor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorPerformance {
    /// Vendor these counters belong to.
    pub vendor: VendorName,
    /// Calls observed in total.
    pub total_requests: u64,
    /// Calls that succeeded.
    pub success_count: u64,
    /// Calls that failed.
    pub failure_count: u64,
    /// Incremental mean response time in milliseconds.
    pub average_response_time_ms: f64,
    /// Incremental mean cost per successful provisioning.
    pub average_cost: f64,
    /// Success rate, 0..=100.
    pub success_rate: f64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// When the vendor last failed.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Whether the vendor is currently eligible for selection.
    pub is_healthy: bool,
}

impl VendorPerformance {
    /// Fresh counters for a vendor with no observed traffic.
    ///
    /// New vendors start optimistic: healthy with a 100% success rate, so
    /// they are immediately eligible for selection.
    pub fn new(vendor: VendorName) -> Self {
        Self {
            vendor,
            total_requests: 0,
            success_count: 0,
            failure_count: 0,
            average_response_time_ms: 0.0,
            average_cost: 0.0,
            success_rate: 100.0,
            consecutive_failures: 0,
            last_failure_time: None,
            is_healthy: true,
        }
    }
}

// =============================================================================
// Tracking contract
// =============================================================================

/// Mutable vendor performance state shared by the selector.
pub trait PerformanceStats: Send + Sync {
    /// Ensure a vendor has an entry, creating fresh counters if absent.
    fn ensure(&self, vendor: &VendorName);

    /// Record a successful call and return the updated snapshot.
    ///
    /// A success clears the consecutive failure streak and restores the
    /// vendor to healthy.
    fn record_success(
        &self,
        vendor: &VendorName,
        response_time_ms: f64,
        cost: f64,
    ) -> VendorPerformance;

    /// Record a failed call and return the updated snapshot.
    ///
    /// The vendor is marked unhealthy once its consecutive failure streak
    /// reaches the tracker's threshold.
    fn record_failure(&self, vendor: &VendorName) -> VendorPerformance;

    /// Apply an active health probe verdict and return the updated snapshot.
    ///
    /// A passing probe clears the failure streak; a failing probe marks the
    /// vendor unhealthy without touching request counters.
    fn apply_probe(&self, vendor: &VendorName, healthy: bool) -> VendorPerformance;

    /// Force a vendor back to healthy, keeping its counters.
    ///
    /// Returns `None` when the vendor has no entry.
    fn reset(&self, vendor: &VendorName) -> Option<VendorPerformance>;

    /// Whether the vendor is eligible for selection.
    ///
    /// Vendors without an entry are treated as healthy.
    fn is_healthy(&self, vendor: &VendorName) -> bool;

    /// Snapshot for one vendor.
    fn snapshot(&self, vendor: &VendorName) -> Option<VendorPerformance>;

    /// Snapshots for every tracked vendor.
    fn snapshots(&self) -> Vec<VendorPerformance>;
}

// =============================================================================
// In-memory tracker
// =============================================================================

/// Process-local [`PerformanceStats`] backed by a mutex-guarded map.
pub struct InMemoryPerformanceTracker {
    stats: Mutex<HashMap<VendorName, VendorPerformance>>,
    clock: Arc<dyn Clock>,
    failure_threshold: u32,
}

impl fmt::Debug for InMemoryPerformanceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryPerformanceTracker")
            .field("failure_threshold", &self.failure_threshold)
            .field("tracked", &self.lock().len())
            .finish()
    }
}

impl InMemoryPerformanceTracker {
    /// Create a tracker tripping vendors unhealthy after `failure_threshold`
    /// consecutive failures.
    pub fn new(failure_threshold: u32) -> Self {
        Self::with_clock(failure_threshold, Arc::new(SystemClock))
    }

    /// Create a tracker reading time from the given clock.
    pub fn with_clock(failure_threshold: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            stats: Mutex::new(HashMap::new()),
            clock,
            failure_threshold,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<VendorName, VendorPerformance>> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn entry<'a>(
        map: &'a mut HashMap<VendorName, VendorPerformance>,
        vendor: &VendorName,
    ) -> &'a mut VendorPerformance {
        map.entry(vendor.clone())
            .or_insert_with(|| VendorPerformance::new(vendor.clone()))
    }
}

/// Incremental mean over `count` samples, where `sample` is the latest.
fn incremental_mean(previous: f64, sample: f64, count: u64) -> f64 {
    if count == 0 {
        return sample;
    }
    (previous * (count - 1) as f64 + sample) / count as f64
}

impl PerformanceStats for InMemoryPerformanceTracker {
    fn ensure(&self, vendor: &VendorName) {
        let mut map = self.lock();
        Self::entry(&mut map, vendor);
    }

    fn record_success(
        &self,
        vendor: &VendorName,
        response_time_ms: f64,
        cost: f64,
    ) -> VendorPerformance {
        let mut map = self.lock();
        let stats = Self::entry(&mut map, vendor);

        stats.total_requests += 1;
        stats.success_count += 1;
        stats.consecutive_failures = 0;
        stats.average_response_time_ms = incremental_mean(
            stats.average_response_time_ms,
            response_time_ms,
            stats.total_requests,
        );
        stats.average_cost = incremental_mean(stats.average_cost, cost, stats.total_requests);
        stats.success_rate = stats.success_count as f64 / stats.total_requests as f64 * 100.0;

        if !stats.is_healthy {
            stats.is_healthy = true;
            #[cfg(feature = "tracing")]
            info!(vendor = %stats.vendor, "Vendor recovered after a successful call");
        }

        stats.clone()
    }

    fn record_failure(&self, vendor: &VendorName) -> VendorPerformance {
        let mut map = self.lock();
        let stats = Self::entry(&mut map, vendor);

        stats.total_requests += 1;
        stats.failure_count += 1;
        stats.consecutive_failures += 1;
        stats.last_failure_time = Some(self.clock.now());
        stats.success_rate = stats.success_count as f64 / stats.total_requests as f64 * 100.0;

        if stats.is_healthy && stats.consecutive_failures >= self.failure_threshold {
            stats.is_healthy = false;
            #[cfg(feature = "tracing")]
            warn!(
                vendor = %stats.vendor,
                consecutive_failures = stats.consecutive_failures,
                "Vendor marked unhealthy after consecutive failures"
            );
        }

        stats.clone()
    }

    fn apply_probe(&self, vendor: &VendorName, healthy: bool) -> VendorPerformance {
        let mut map = self.lock();
        let stats = Self::entry(&mut map, vendor);

        if healthy {
            stats.consecutive_failures = 0;
        }
        stats.is_healthy = healthy;

        stats.clone()
    }

    fn reset(&self, vendor: &VendorName) -> Option<VendorPerformance> {
        let mut map = self.lock();
        let stats = map.get_mut(vendor)?;

        stats.is_healthy = true;
        stats.consecutive_failures = 0;

        Some(stats.clone())
    }

    fn is_healthy(&self, vendor: &VendorName) -> bool {
        self.lock().get(vendor).is_none_or(|stats| stats.is_healthy)
    }

    fn snapshot(&self, vendor: &VendorName) -> Option<VendorPerformance> {
        self.lock().get(vendor).cloned()
    }

    fn snapshots(&self) -> Vec<VendorPerformance> {
        self.lock().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn vendor() -> VendorName {
        VendorName::from("sms-activate")
    }

    #[test]
    fn test_new_vendor_starts_optimistic() {
        let tracker = InMemoryPerformanceTracker::new(3);
        tracker.ensure(&vendor());

        let stats = tracker.snapshot(&vendor()).unwrap();
        assert!(stats.is_healthy);
        assert_eq!(stats.success_rate, 100.0);
        assert_eq!(stats.total_requests, 0);
    }

    #[test]
    fn test_unknown_vendor_is_treated_as_healthy() {
        let tracker = InMemoryPerformanceTracker::new(3);
        assert!(tracker.is_healthy(&vendor()));
        assert!(tracker.snapshot(&vendor()).is_none());
    }

    #[test]
    fn test_breaker_trips_at_threshold() {
        let tracker = InMemoryPerformanceTracker::new(3);

        tracker.record_failure(&vendor());
        let after_two = tracker.record_failure(&vendor());
        assert!(after_two.is_healthy);
        assert_eq!(after_two.consecutive_failures, 2);

        let after_three = tracker.record_failure(&vendor());
        assert!(!after_three.is_healthy);
        assert_eq!(after_three.consecutive_failures, 3);
        assert!(!tracker.is_healthy(&vendor()));
    }

    #[test]
    fn test_success_clears_streak_and_restores_health() {
        let tracker = InMemoryPerformanceTracker::new(3);
        for _ in 0..3 {
            tracker.record_failure(&vendor());
        }
        assert!(!tracker.is_healthy(&vendor()));

        let stats = tracker.record_success(&vendor(), 1200.0, 0.10);
        assert!(stats.is_healthy);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.success_rate, 25.0);
    }

    #[test]
    fn test_reset_restores_health_but_keeps_counters() {
        let tracker = InMemoryPerformanceTracker::new(3);
        for _ in 0..3 {
            tracker.record_failure(&vendor());
        }

        let stats = tracker.reset(&vendor()).unwrap();
        assert!(stats.is_healthy);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.failure_count, 3);
        assert_eq!(stats.total_requests, 3);

        assert!(tracker.reset(&VendorName::from("ghost")).is_none());
    }

    #[test]
    fn test_probe_verdicts() {
        let tracker = InMemoryPerformanceTracker::new(3);
        tracker.record_failure(&vendor());
        tracker.record_failure(&vendor());

        let failed = tracker.apply_probe(&vendor(), false);
        assert!(!failed.is_healthy);
        assert_eq!(failed.consecutive_failures, 2);
        assert_eq!(failed.total_requests, 2);

        let passed = tracker.apply_probe(&vendor(), true);
        assert!(passed.is_healthy);
        assert_eq!(passed.consecutive_failures, 0);
        assert_eq!(passed.total_requests, 2);
    }

    #[test]
    fn test_incremental_means_over_all_requests() {
        let tracker = InMemoryPerformanceTracker::new(3);

        tracker.record_success(&vendor(), 1000.0, 0.10);
        let second = tracker.record_success(&vendor(), 2000.0, 0.20);
        assert!((second.average_response_time_ms - 1500.0).abs() < 1e-9);
        assert!((second.average_cost - 0.15).abs() < 1e-9);

        // Failures count toward total_requests, so they dilute later means.
        tracker.record_failure(&vendor());
        let fourth = tracker.record_success(&vendor(), 3000.0, 0.30);

        assert_eq!(fourth.total_requests, 4);
        assert!((fourth.average_response_time_ms - 1875.0).abs() < 1e-9);
        assert!((fourth.average_cost - 0.1875).abs() < 1e-9);
        assert_eq!(fourth.success_rate, 75.0);
    }

    #[test]
    fn test_failure_time_comes_from_clock() {
        let frozen = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(frozen));
        let tracker = InMemoryPerformanceTracker::with_clock(3, clock);

        let stats = tracker.record_failure(&vendor());
        assert_eq!(stats.last_failure_time, Some(frozen));
    }
}
