//! Pool orchestration: acquisition, reuse lifecycle and maintenance sweeps.

use super::number::{NumberStatus, PooledNumber};
use super::store::{ClaimOrder, NumberPoolStore, PoolFilter, PoolStoreError, PoolUpdate};
use crate::clock::{Clock, SystemClock};
use crate::metrics::{NoopPoolMetrics, PoolMetrics};
use crate::providers::ProviderError;
use crate::selector::{PlatformSelector, SelectorError};
use crate::types::{CallerId, CountryCode, PoolNumberId, ServiceCode};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[cfg(feature = "tracing")]
use opentelemetry::trace::Status;
#[cfg(feature = "tracing")]
use tracing::Span;
#[cfg(feature = "tracing")]
use tracing::{debug, info, warn};
#[cfg(feature = "tracing")]
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Re-reads before mark-used gives up on a contended row.
const MARK_USED_ATTEMPTS: usize = 3;

// =============================================================================
// Configuration
// =============================================================================

/// Pool sizing and lifecycle tuning.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Available count under which replenishment kicks in.
    pub min_pool_size: u32,
    /// Available count replenishment aims for.
    pub target_pool_size: u32,
    /// Hard cap on the replenishment goal.
    pub max_pool_size: u32,
    /// How long a used number rests before it may serve again.
    pub cooldown: chrono::Duration,
    /// How long a number stays claimable after entering the pool.
    pub number_lifetime: chrono::Duration,
    /// How long expired rows are kept before being purged.
    pub retention: chrono::Duration,
    /// Verifications one number may serve in total.
    pub max_reuse_count: u32,
    /// Budget for a single vendor provisioning call.
    pub provision_timeout: Duration,
    /// Claim precedence given to freshly preheated numbers.
    pub preheat_priority: i32,
    /// Claim precedence given to numbers returning from cooldown.
    pub reuse_priority: i32,
    /// Service and country combinations the replenish sweep maintains.
    pub replenish_targets: Vec<(ServiceCode, CountryCode)>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 5,
            target_pool_size: 10,
            max_pool_size: 20,
            cooldown: chrono::Duration::hours(24),
            number_lifetime: chrono::Duration::minutes(20),
            retention: chrono::Duration::days(7),
            max_reuse_count: 3,
            provision_timeout: Duration::from_secs(30),
            preheat_priority: 10,
            reuse_priority: 5,
            replenish_targets: Vec::new(),
        }
    }
}

impl PoolConfig {
    /// Create a new builder for PoolConfig.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sms_pool::pool::PoolConfig;
    ///
    /// let config = PoolConfig::builder()
    ///     .min_pool_size(3)
    ///     .target_pool_size(6)
    ///     .replenish_target("tg", "US")
    ///     .build();
    ///
    /// assert_eq!(config.min_pool_size, 3);
    /// assert_eq!(config.replenish_targets.len(), 1);
    /// ```
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// Builder for PoolConfig.
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the available count under which replenishment kicks in.
    ///
    /// Default: 5
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.config.min_pool_size = size;
        self
    }

    /// Set the available count replenishment aims for.
    ///
    /// Default: 10
    pub fn target_pool_size(mut self, size: u32) -> Self {
        self.config.target_pool_size = size;
        self
    }

    /// Set the hard cap on the replenishment goal.
    ///
    /// Default: 20
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.config.max_pool_size = size;
        self
    }

    /// Set the rest period after a successful use.
    ///
    /// Default: 24 hours
    pub fn cooldown(mut self, cooldown: chrono::Duration) -> Self {
        self.config.cooldown = cooldown;
        self
    }

    /// Set how long a number stays claimable.
    ///
    /// Default: 20 minutes
    pub fn number_lifetime(mut self, lifetime: chrono::Duration) -> Self {
        self.config.number_lifetime = lifetime;
        self
    }

    /// Set how long expired rows are kept before purging.
    ///
    /// Default: 7 days
    pub fn retention(mut self, retention: chrono::Duration) -> Self {
        self.config.retention = retention;
        self
    }

    /// Set the total verifications one number may serve.
    ///
    /// Default: 3
    pub fn max_reuse_count(mut self, count: u32) -> Self {
        self.config.max_reuse_count = count;
        self
    }

    /// Set the budget for a single vendor provisioning call.
    ///
    /// Default: 30 seconds
    pub fn provision_timeout(mut self, timeout: Duration) -> Self {
        self.config.provision_timeout = timeout;
        self
    }

    /// Set the claim precedence of freshly preheated numbers.
    ///
    /// Default: 10
    pub fn preheat_priority(mut self, priority: i32) -> Self {
        self.config.preheat_priority = priority;
        self
    }

    /// Set the claim precedence of numbers returning from cooldown.
    ///
    /// Default: 5
    pub fn reuse_priority(mut self, priority: i32) -> Self {
        self.config.reuse_priority = priority;
        self
    }

    /// Add a service and country combination for the replenish sweep.
    pub fn replenish_target(
        mut self,
        service: impl Into<ServiceCode>,
        country: impl Into<CountryCode>,
    ) -> Self {
        self.config
            .replenish_targets
            .push((service.into(), country.into()));
        self
    }

    /// Build the PoolConfig.
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Aggregate pool counters for one statistics query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoolStatistics {
    /// Rows matching the query scope.
    pub total: u64,
    /// Rows ready to be claimed.
    pub available: u64,
    /// Rows currently held by callers.
    pub reserved: u64,
    /// Rows resting in cooldown.
    pub used: u64,
    /// Available rows that were preheated.
    pub preheated: u64,
    /// Share of rows in active use, 0..=100.
    pub utilization_rate: f64,
    /// Share of available rows that were preheated, 0..=100.
    pub preheated_rate: f64,
}

// =============================================================================
// Errors
// =============================================================================

/// Error surfaced by pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool store failed.
    #[error(transparent)]
    Store(#[from] PoolStoreError),
}

/// Why a single preheat unit failed; stays internal to the batch loop.
#[derive(Debug, Error)]
enum PreheatError {
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] PoolStoreError),
}

// =============================================================================
// NumberPoolManager
// =============================================================================

/// Orchestrates the virtual number pool.
///
/// Handout takes preheated numbers first and falls back to any available
/// number; a miss returns `Ok(None)` so the caller can provision directly.
/// Maintenance runs as three idempotent sweeps (replenish, cleanup, cooldown)
/// that tolerate concurrent instances through conditional updates, while a
/// per-process guard keeps each sweep from overlapping itself.
pub struct NumberPoolManager {
    store: Arc<dyn NumberPoolStore>,
    selector: Arc<PlatformSelector>,
    metrics: Arc<dyn PoolMetrics>,
    clock: Arc<dyn Clock>,
    config: PoolConfig,
    replenish_guard: tokio::sync::Mutex<()>,
    cleanup_guard: tokio::sync::Mutex<()>,
    cooldown_guard: tokio::sync::Mutex<()>,
}

impl fmt::Debug for NumberPoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumberPoolManager")
            .field("selector", &self.selector)
            .field("config", &self.config)
            .finish()
    }
}

impl NumberPoolManager {
    /// Create a manager over the given store and selector.
    pub fn new(
        store: Arc<dyn NumberPoolStore>,
        selector: Arc<PlatformSelector>,
        config: PoolConfig,
    ) -> Self {
        Self {
            store,
            selector,
            metrics: Arc::new(NoopPoolMetrics),
            clock: Arc::new(SystemClock),
            config,
            replenish_guard: tokio::sync::Mutex::new(()),
            cleanup_guard: tokio::sync::Mutex::new(()),
            cooldown_guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Replace the metrics sink.
    pub fn with_metrics(mut self, metrics: Arc<dyn PoolMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The selector this pool provisions through.
    pub fn selector(&self) -> &Arc<PlatformSelector> {
        &self.selector
    }

    /// The active configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Claim an available number for a caller.
    ///
    /// Preheated numbers go first, by priority and preheat age; other
    /// available numbers follow, oldest first. `Ok(None)` means the pool has
    /// nothing usable for this service and country right now.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "NumberPoolManager::acquire_number",
            skip_all,
            fields(service = %service, country = %country, number_id = tracing::field::Empty)
        )
    )]
    pub async fn acquire_number(
        &self,
        service: &ServiceCode,
        country: &CountryCode,
        caller: Option<&CallerId>,
    ) -> Result<Option<PooledNumber>, PoolError> {
        let now = self.clock.now();
        let claim = PoolUpdate::new()
            .status(NumberStatus::Reserved)
            .reserved_by(caller.cloned())
            .reserved_at(now)
            .bump_reserved_count();

        let preheated = PoolFilter::new()
            .service(service)
            .country(country)
            .status(NumberStatus::Available)
            .preheated(true)
            .expires_after(now);
        let mut claimed = self
            .store
            .claim_one(preheated, ClaimOrder::PreheatedFirst, claim.clone())
            .await?;

        if claimed.is_none() {
            let any_available = PoolFilter::new()
                .service(service)
                .country(country)
                .status(NumberStatus::Available)
                .expires_after(now);
            claimed = self
                .store
                .claim_one(any_available, ClaimOrder::OldestFirst, claim)
                .await?;
        }

        match claimed {
            Some(number) => {
                self.metrics.record_pool_reuse(&number.vendor);
                #[cfg(feature = "tracing")]
                {
                    Span::current()
                        .record("number_id", number.id.to_string().as_str())
                        .set_status(Status::Ok);
                    info!(
                        number_id = %number.id,
                        phone_number = %number.phone_number,
                        vendor = %number.vendor,
                        preheated = number.preheated,
                        reserved_count = number.reserved_count,
                        "Pool number reserved"
                    );
                }
                Ok(Some(number))
            }
            None => {
                #[cfg(feature = "tracing")]
                debug!("Pool miss, no available number");
                Ok(None)
            }
        }
    }

    /// Mark a reserved number as having served a verification.
    ///
    /// A successful verification extends the expiry by the cooldown as long
    /// as the number still has reuse budget left; otherwise the expiry is
    /// left untouched. Unknown or non-reserved numbers are logged and
    /// ignored.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "NumberPoolManager::mark_number_used",
            skip_all,
            fields(number_id = %id, success)
        )
    )]
    pub async fn mark_number_used(&self, id: PoolNumberId, success: bool) -> Result<(), PoolError> {
        for _ in 0..MARK_USED_ATTEMPTS {
            let Some(row) = self.store.get(id).await? else {
                #[cfg(feature = "tracing")]
                warn!(number_id = %id, "Cannot mark unknown number as used");
                return Ok(());
            };
            if row.status != NumberStatus::Reserved {
                #[cfg(feature = "tracing")]
                warn!(number_id = %id, status = %row.status, "Number is not reserved, skipping");
                return Ok(());
            }

            let used_count_after = row.used_count + 1;
            let mut update = PoolUpdate::new()
                .status(NumberStatus::Used)
                .bump_used_count();
            if success && used_count_after < self.config.max_reuse_count {
                update = update.expires_at(self.clock.now() + self.config.cooldown);
            }

            let guard = PoolFilter::new()
                .status(NumberStatus::Reserved)
                .used_count(row.used_count);
            if let Some(_updated) = self.store.update_by_id(id, guard, update).await? {
                #[cfg(feature = "tracing")]
                info!(
                    number_id = %id,
                    used_count = _updated.used_count,
                    expires_at = %_updated.expires_at,
                    "Number marked as used"
                );
                return Ok(());
            }
            // Lost the race; re-read and try once more.
        }
        #[cfg(feature = "tracing")]
        warn!(number_id = %id, "Gave up marking number as used after contention");
        Ok(())
    }

    /// Return a reserved number without consuming reuse budget.
    ///
    /// The number goes back to available if its lifetime still holds,
    /// otherwise it is expired. Unknown or non-reserved numbers are logged
    /// and ignored.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "NumberPoolManager::release_number",
            skip_all,
            fields(number_id = %id)
        )
    )]
    pub async fn release_number(&self, id: PoolNumberId) -> Result<(), PoolError> {
        let Some(row) = self.store.get(id).await? else {
            #[cfg(feature = "tracing")]
            warn!(number_id = %id, "Cannot release unknown number");
            return Ok(());
        };
        if row.status != NumberStatus::Reserved {
            #[cfg(feature = "tracing")]
            warn!(number_id = %id, status = %row.status, "Number is not reserved, skipping");
            return Ok(());
        }

        let next_status = if row.is_expired_at(self.clock.now()) {
            NumberStatus::Expired
        } else {
            NumberStatus::Available
        };
        let update = PoolUpdate::new().status(next_status).clear_reservation();
        let guard = PoolFilter::new().status(NumberStatus::Reserved);
        match self.store.update_by_id(id, guard, update).await? {
            Some(_updated) => {
                #[cfg(feature = "tracing")]
                info!(number_id = %id, status = %_updated.status, "Number released");
            }
            None => {
                #[cfg(feature = "tracing")]
                debug!(number_id = %id, "Release lost a race, nothing to do");
            }
        }
        Ok(())
    }

    /// Provision `count` numbers ahead of demand.
    ///
    /// Units fail independently; the batch reports how many numbers actually
    /// entered the pool.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "NumberPoolManager::preheat_numbers",
            skip_all,
            fields(service = %service, country = %country, count)
        )
    )]
    pub async fn preheat_numbers(
        &self,
        service: &ServiceCode,
        country: &CountryCode,
        count: u32,
    ) -> u32 {
        let mut created = 0u32;
        for _ in 0..count {
            match self.preheat_one(service, country).await {
                Ok(_id) => {
                    created += 1;
                    #[cfg(feature = "tracing")]
                    debug!(number_id = %_id, "Preheated number added to pool");
                }
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    warn!(error = %_err, "Failed to preheat a number");
                }
            }
        }
        #[cfg(feature = "tracing")]
        info!(created, requested = count, "Preheat batch finished");
        created
    }

    async fn preheat_one(
        &self,
        service: &ServiceCode,
        country: &CountryCode,
    ) -> Result<PoolNumberId, PreheatError> {
        let selection = self.selector.select_best_platform(service, country).await?;

        let started = Instant::now();
        let attempt = tokio::time::timeout(
            self.config.provision_timeout,
            selection.adapter.get_number(service, country),
        );
        let provisioned = match attempt.await {
            Ok(Ok(provisioned)) => {
                self.selector
                    .record_success(&selection.vendor, started.elapsed(), provisioned.cost);
                provisioned
            }
            Ok(Err(err)) => {
                self.selector.record_failure(&selection.vendor, &err);
                return Err(err.into());
            }
            Err(_) => {
                let err = ProviderError::timeout(
                    selection.vendor.clone(),
                    self.config.provision_timeout,
                );
                self.selector.record_failure(&selection.vendor, &err);
                return Err(err.into());
            }
        };

        let now = self.clock.now();
        let number = PooledNumber::preheated(
            selection.vendor,
            provisioned,
            service.clone(),
            country.clone(),
            self.config.preheat_priority,
            now,
            now + self.config.number_lifetime,
        );
        let id = number.id;
        self.store.insert(number).await?;
        Ok(id)
    }

    /// Aggregate counters for the pool, optionally scoped to a service and
    /// country.
    pub async fn pool_statistics(
        &self,
        service: Option<&ServiceCode>,
        country: Option<&CountryCode>,
    ) -> Result<PoolStatistics, PoolError> {
        let mut base = PoolFilter::new();
        if let Some(service) = service {
            base = base.service(service);
        }
        if let Some(country) = country {
            base = base.country(country);
        }

        let total = self.store.count(base.clone()).await?;
        let available = self
            .store
            .count(base.clone().status(NumberStatus::Available))
            .await?;
        let reserved = self
            .store
            .count(base.clone().status(NumberStatus::Reserved))
            .await?;
        let used = self
            .store
            .count(base.clone().status(NumberStatus::Used))
            .await?;
        let preheated = self
            .store
            .count(base.status(NumberStatus::Available).preheated(true))
            .await?;

        let utilization_rate = if total == 0 {
            0.0
        } else {
            (reserved + used) as f64 / total as f64 * 100.0
        };
        let preheated_rate = if available == 0 {
            0.0
        } else {
            preheated as f64 / available as f64 * 100.0
        };

        Ok(PoolStatistics {
            total,
            available,
            reserved,
            used,
            preheated,
            utilization_rate,
            preheated_rate,
        })
    }

    /// Top the pool up for every configured replenish target.
    ///
    /// Targets fail independently; the sweep never surfaces an error.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "NumberPoolManager::auto_replenish_pool", skip_all)
    )]
    pub async fn auto_replenish_pool(&self) {
        let Ok(_guard) = self.replenish_guard.try_lock() else {
            #[cfg(feature = "tracing")]
            warn!("Replenish sweep already running, skipping this round");
            return;
        };

        for (service, country) in &self.config.replenish_targets {
            if let Err(_err) = self.replenish_target(service, country).await {
                #[cfg(feature = "tracing")]
                warn!(
                    service = %service,
                    country = %country,
                    error = %_err,
                    "Replenish failed for target"
                );
            }
        }
    }

    async fn replenish_target(
        &self,
        service: &ServiceCode,
        country: &CountryCode,
    ) -> Result<(), PoolError> {
        let stats = self.pool_statistics(Some(service), Some(country)).await?;
        if stats.available >= u64::from(self.config.min_pool_size) {
            #[cfg(feature = "tracing")]
            debug!(
                service = %service,
                country = %country,
                available = stats.available,
                "Pool level healthy"
            );
            return Ok(());
        }

        let goal = u64::from(self.config.target_pool_size.min(self.config.max_pool_size));
        let needed = goal.saturating_sub(stats.available) as u32;
        #[cfg(feature = "tracing")]
        info!(
            service = %service,
            country = %country,
            available = stats.available,
            needed,
            "Pool below minimum, replenishing"
        );
        self.preheat_numbers(service, country, needed).await;
        Ok(())
    }

    /// Expire lapsed available numbers and purge expired rows past retention.
    ///
    /// Store failures are logged, not surfaced; the next round retries.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "NumberPoolManager::cleanup_expired_numbers", skip_all)
    )]
    pub async fn cleanup_expired_numbers(&self) {
        let Ok(_guard) = self.cleanup_guard.try_lock() else {
            #[cfg(feature = "tracing")]
            warn!("Cleanup sweep already running, skipping this round");
            return;
        };
        let now = self.clock.now();

        let lapsed = PoolFilter::new()
            .status(NumberStatus::Available)
            .expires_before(now);
        match self
            .store
            .update_where(lapsed, PoolUpdate::new().status(NumberStatus::Expired))
            .await
        {
            Ok(_swept) => {
                #[cfg(feature = "tracing")]
                if _swept > 0 {
                    info!(count = _swept, "Expired lapsed pool numbers");
                }
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                warn!(error = %_err, "Failed to expire lapsed numbers");
            }
        }

        let purgeable = PoolFilter::new()
            .status(NumberStatus::Expired)
            .expires_before(now - self.config.retention);
        match self.store.delete_where(purgeable).await {
            Ok(_purged) => {
                #[cfg(feature = "tracing")]
                if _purged > 0 {
                    info!(count = _purged, "Purged expired numbers past retention");
                }
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                warn!(error = %_err, "Failed to purge expired numbers");
            }
        }
    }

    /// Return used numbers whose cooldown has lapsed to the pool.
    ///
    /// Reactivated numbers come back un-preheated at the reuse priority with
    /// a fresh lifetime. Store failures are logged, not surfaced.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "NumberPoolManager::process_cooldown_numbers", skip_all)
    )]
    pub async fn process_cooldown_numbers(&self) {
        let Ok(_guard) = self.cooldown_guard.try_lock() else {
            #[cfg(feature = "tracing")]
            warn!("Cooldown sweep already running, skipping this round");
            return;
        };
        let now = self.clock.now();

        let cooled = PoolFilter::new()
            .status(NumberStatus::Used)
            .expires_before(now);
        let reactivate = PoolUpdate::new()
            .status(NumberStatus::Available)
            .clear_reservation()
            .preheated(false)
            .priority(self.config.reuse_priority)
            .expires_at(now + self.config.number_lifetime);
        match self.store.update_where(cooled, reactivate).await {
            Ok(_returned) => {
                #[cfg(feature = "tracing")]
                if _returned > 0 {
                    info!(count = _returned, "Returned cooled numbers to the pool");
                }
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                warn!(error = %_err, "Failed to reactivate cooled numbers");
            }
        }
    }
}
