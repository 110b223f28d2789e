//! Pool persistence contract and the in-memory reference store.

use super::number::{NumberStatus, PooledNumber};
use crate::types::{CallerId, CountryCode, PoolNumberId, ServiceCode};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Error raised by a pool store backend.
#[derive(Debug, Clone, Error)]
pub enum PoolStoreError {
    /// Backend failed to read or write.
    #[error("pool storage error: {0}")]
    Storage(String),
}

// =============================================================================
// Filter
// =============================================================================

/// Row predicate used by queries, guards and sweeps.
///
/// Every field is optional; an empty filter matches every row. Time bounds
/// are strict comparisons on `expires_at`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolFilter {
    /// Match rows provisioned for this service.
    pub service_code: Option<ServiceCode>,
    /// Match rows in this country.
    pub country_code: Option<CountryCode>,
    /// Match rows in this lifecycle state.
    pub status: Option<NumberStatus>,
    /// Match rows by preheat flag.
    pub preheated: Option<bool>,
    /// Match rows with `expires_at` strictly before this instant.
    pub expires_before: Option<DateTime<Utc>>,
    /// Match rows with `expires_at` strictly after this instant.
    pub expires_after: Option<DateTime<Utc>>,
    /// Match rows with exactly this use count.
    pub used_count: Option<u32>,
}

impl PoolFilter {
    /// Filter matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one service.
    pub fn service(mut self, service: &ServiceCode) -> Self {
        self.service_code = Some(service.clone());
        self
    }

    /// Restrict to one country.
    pub fn country(mut self, country: &CountryCode) -> Self {
        self.country_code = Some(country.clone());
        self
    }

    /// Restrict to one lifecycle state.
    pub fn status(mut self, status: NumberStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict by preheat flag.
    pub fn preheated(mut self, preheated: bool) -> Self {
        self.preheated = Some(preheated);
        self
    }

    /// Restrict to rows expiring strictly before `instant`.
    pub fn expires_before(mut self, instant: DateTime<Utc>) -> Self {
        self.expires_before = Some(instant);
        self
    }

    /// Restrict to rows expiring strictly after `instant`.
    pub fn expires_after(mut self, instant: DateTime<Utc>) -> Self {
        self.expires_after = Some(instant);
        self
    }

    /// Restrict to rows with exactly this use count.
    pub fn used_count(mut self, used_count: u32) -> Self {
        self.used_count = Some(used_count);
        self
    }

    /// Whether `row` satisfies every set condition.
    pub fn matches(&self, row: &PooledNumber) -> bool {
        if let Some(service_code) = &self.service_code {
            if row.service_code != *service_code {
                return false;
            }
        }
        if let Some(country_code) = &self.country_code {
            if row.country_code != *country_code {
                return false;
            }
        }
        if let Some(status) = self.status {
            if row.status != status {
                return false;
            }
        }
        if let Some(preheated) = self.preheated {
            if row.preheated != preheated {
                return false;
            }
        }
        if let Some(expires_before) = self.expires_before {
            if row.expires_at >= expires_before {
                return false;
            }
        }
        if let Some(expires_after) = self.expires_after {
            if row.expires_at <= expires_after {
                return false;
            }
        }
        if let Some(used_count) = self.used_count {
            if row.used_count != used_count {
                return false;
            }
        }
        true
    }
}

// =============================================================================
// Update
// =============================================================================

/// Partial row update.
///
/// Reservation fields use nested options: the outer level says whether to
/// touch the field, the inner level is the value to write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolUpdate {
    /// New lifecycle state.
    pub status: Option<NumberStatus>,
    /// New reservation holder.
    pub reserved_by: Option<Option<CallerId>>,
    /// New reservation timestamp.
    pub reserved_at: Option<Option<DateTime<Utc>>>,
    /// New preheat flag.
    pub preheated: Option<bool>,
    /// New claim precedence.
    pub priority: Option<i32>,
    /// New expiry instant.
    pub expires_at: Option<DateTime<Utc>>,
    /// Increment `reserved_count` by one.
    pub bump_reserved_count: bool,
    /// Increment `used_count` by one.
    pub bump_used_count: bool,
}

impl PoolUpdate {
    /// Update touching nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lifecycle state.
    pub fn status(mut self, status: NumberStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the reservation holder.
    pub fn reserved_by(mut self, caller: Option<CallerId>) -> Self {
        self.reserved_by = Some(caller);
        self
    }

    /// Set the reservation timestamp.
    pub fn reserved_at(mut self, instant: DateTime<Utc>) -> Self {
        self.reserved_at = Some(Some(instant));
        self
    }

    /// Drop the reservation holder and timestamp.
    pub fn clear_reservation(mut self) -> Self {
        self.reserved_by = Some(None);
        self.reserved_at = Some(None);
        self
    }

    /// Set the preheat flag.
    pub fn preheated(mut self, preheated: bool) -> Self {
        self.preheated = Some(preheated);
        self
    }

    /// Set the claim precedence.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the expiry instant.
    pub fn expires_at(mut self, instant: DateTime<Utc>) -> Self {
        self.expires_at = Some(instant);
        self
    }

    /// Increment `reserved_count` when applied.
    pub fn bump_reserved_count(mut self) -> Self {
        self.bump_reserved_count = true;
        self
    }

    /// Increment `used_count` when applied.
    pub fn bump_used_count(mut self) -> Self {
        self.bump_used_count = true;
        self
    }

    /// Apply the update to a row in place.
    pub fn apply(&self, row: &mut PooledNumber) {
        if let Some(status) = self.status {
            row.status = status;
        }
        if let Some(reserved_by) = &self.reserved_by {
            row.reserved_by = reserved_by.clone();
        }
        if let Some(reserved_at) = self.reserved_at {
            row.reserved_at = reserved_at;
        }
        if let Some(preheated) = self.preheated {
            row.preheated = preheated;
        }
        if let Some(priority) = self.priority {
            row.priority = priority;
        }
        if let Some(expires_at) = self.expires_at {
            row.expires_at = expires_at;
        }
        if self.bump_reserved_count {
            row.reserved_count += 1;
        }
        if self.bump_used_count {
            row.used_count += 1;
        }
    }
}

// =============================================================================
// Claim ordering
// =============================================================================

/// Which matching row a claim takes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOrder {
    /// Highest priority first, then earliest preheat time.
    PreheatedFirst,
    /// Highest priority first, then earliest creation time.
    OldestFirst,
}

impl ClaimOrder {
    /// Ordering between two candidate rows; `Less` means `a` is taken first.
    pub fn compare(&self, a: &PooledNumber, b: &PooledNumber) -> Ordering {
        match self {
            ClaimOrder::PreheatedFirst => b
                .priority
                .cmp(&a.priority)
                .then_with(|| cmp_none_last(&a.preheated_at, &b.preheated_at)),
            ClaimOrder::OldestFirst => b
                .priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at)),
        }
    }
}

/// Ascending comparison over options with `None` sorting last.
fn cmp_none_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// =============================================================================
// Store contract
// =============================================================================

/// Persistence for pooled numbers.
///
/// `claim_one` and `update_by_id` are the atomic primitives reservation
/// correctness rests on: a row that stops matching between read and write
/// must yield `None`, never a partial write and never an error. Backends
/// typically implement them with a transaction or a conditional update.
#[async_trait::async_trait]
pub trait NumberPoolStore: Send + Sync {
    /// Insert a new row.
    async fn insert(&self, number: PooledNumber) -> Result<(), PoolStoreError>;

    /// Fetch a row by id.
    async fn get(&self, id: PoolNumberId) -> Result<Option<PooledNumber>, PoolStoreError>;

    /// Fetch every matching row, oldest first.
    async fn find_many(&self, filter: PoolFilter) -> Result<Vec<PooledNumber>, PoolStoreError>;

    /// Atomically take the best matching row and apply `update` to it.
    ///
    /// Returns the updated row, or `None` when nothing matched.
    async fn claim_one(
        &self,
        filter: PoolFilter,
        order: ClaimOrder,
        update: PoolUpdate,
    ) -> Result<Option<PooledNumber>, PoolStoreError>;

    /// Apply `update` to the row with `id` if it still matches `guard`.
    ///
    /// Returns the updated row; `None` means the row is gone or the guard no
    /// longer holds, i.e. another writer got there first.
    async fn update_by_id(
        &self,
        id: PoolNumberId,
        guard: PoolFilter,
        update: PoolUpdate,
    ) -> Result<Option<PooledNumber>, PoolStoreError>;

    /// Apply `update` to every matching row, returning how many changed.
    async fn update_where(
        &self,
        filter: PoolFilter,
        update: PoolUpdate,
    ) -> Result<u64, PoolStoreError>;

    /// Count matching rows.
    async fn count(&self, filter: PoolFilter) -> Result<u64, PoolStoreError>;

    /// Delete matching rows, returning how many went away.
    async fn delete_where(&self, filter: PoolFilter) -> Result<u64, PoolStoreError>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local [`NumberPoolStore`] backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct InMemoryNumberPoolStore {
    rows: Mutex<HashMap<PoolNumberId, PooledNumber>>,
}

impl InMemoryNumberPoolStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PoolNumberId, PooledNumber>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl NumberPoolStore for InMemoryNumberPoolStore {
    async fn insert(&self, number: PooledNumber) -> Result<(), PoolStoreError> {
        self.lock().insert(number.id, number);
        Ok(())
    }

    async fn get(&self, id: PoolNumberId) -> Result<Option<PooledNumber>, PoolStoreError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn find_many(&self, filter: PoolFilter) -> Result<Vec<PooledNumber>, PoolStoreError> {
        let mut rows: Vec<PooledNumber> = self
            .lock()
            .values()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn claim_one(
        &self,
        filter: PoolFilter,
        order: ClaimOrder,
        update: PoolUpdate,
    ) -> Result<Option<PooledNumber>, PoolStoreError> {
        let mut rows = self.lock();
        let best = rows
            .values()
            .filter(|row| filter.matches(row))
            .min_by(|a, b| order.compare(a, b))
            .map(|row| row.id);
        let Some(id) = best else {
            return Ok(None);
        };
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| PoolStoreError::Storage("claimed row vanished".to_string()))?;
        update.apply(row);
        Ok(Some(row.clone()))
    }

    async fn update_by_id(
        &self,
        id: PoolNumberId,
        guard: PoolFilter,
        update: PoolUpdate,
    ) -> Result<Option<PooledNumber>, PoolStoreError> {
        let mut rows = self.lock();
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if !guard.matches(row) {
            return Ok(None);
        }
        update.apply(row);
        Ok(Some(row.clone()))
    }

    async fn update_where(
        &self,
        filter: PoolFilter,
        update: PoolUpdate,
    ) -> Result<u64, PoolStoreError> {
        let mut rows = self.lock();
        let mut changed = 0u64;
        for row in rows.values_mut() {
            if filter.matches(row) {
                update.apply(row);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn count(&self, filter: PoolFilter) -> Result<u64, PoolStoreError> {
        Ok(self.lock().values().filter(|row| filter.matches(row)).count() as u64)
    }

    async fn delete_where(&self, filter: PoolFilter) -> Result<u64, PoolStoreError> {
        let mut rows = self.lock();
        let before = rows.len();
        rows.retain(|_, row| !filter.matches(row));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProvisionedNumber;
    use crate::types::{ActivationId, PhoneNumber, VendorName};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn number(seq: u32, now: DateTime<Utc>) -> PooledNumber {
        PooledNumber::preheated(
            VendorName::from("sms-activate"),
            ProvisionedNumber {
                activation_id: ActivationId::from(format!("act-{seq}")),
                phone_number: PhoneNumber::from(format!("7900000{seq:04}")),
                cost: 0.10,
            },
            ServiceCode::from("tg"),
            CountryCode::from("US"),
            10,
            now,
            now + Duration::minutes(20),
        )
    }

    #[test]
    fn test_filter_matches() {
        let now = base_time();
        let row = number(1, now);

        assert!(PoolFilter::new().matches(&row));
        assert!(
            PoolFilter::new()
                .service(&ServiceCode::from("tg"))
                .country(&CountryCode::from("US"))
                .status(NumberStatus::Available)
                .preheated(true)
                .matches(&row)
        );
        let other_service = PoolFilter::new().service(&ServiceCode::from("wa"));
        assert!(!other_service.matches(&row));
        assert!(!PoolFilter::new().status(NumberStatus::Used).matches(&row));
        assert!(!PoolFilter::new().used_count(1).matches(&row));

        // Bounds on expires_at are strict.
        let just_after = row.expires_at + Duration::seconds(1);
        let just_before = row.expires_at - Duration::seconds(1);
        assert!(!PoolFilter::new().expires_before(row.expires_at).matches(&row));
        assert!(PoolFilter::new().expires_before(just_after).matches(&row));
        assert!(!PoolFilter::new().expires_after(row.expires_at).matches(&row));
        assert!(PoolFilter::new().expires_after(just_before).matches(&row));
    }

    #[test]
    fn test_update_apply_and_clear_reservation() {
        let now = base_time();
        let mut row = number(1, now);

        PoolUpdate::new()
            .status(NumberStatus::Reserved)
            .reserved_by(Some(CallerId::from("caller-1")))
            .reserved_at(now)
            .bump_reserved_count()
            .apply(&mut row);

        assert_eq!(row.status, NumberStatus::Reserved);
        assert_eq!(row.reserved_by, Some(CallerId::from("caller-1")));
        assert_eq!(row.reserved_at, Some(now));
        assert_eq!(row.reserved_count, 1);

        PoolUpdate::new()
            .status(NumberStatus::Available)
            .clear_reservation()
            .apply(&mut row);

        assert_eq!(row.status, NumberStatus::Available);
        assert!(row.reserved_by.is_none());
        assert!(row.reserved_at.is_none());
        assert_eq!(row.reserved_count, 1);
    }

    #[tokio::test]
    async fn test_claim_prefers_priority_then_preheat_age() {
        let now = base_time();
        let store = InMemoryNumberPoolStore::new();

        let mut low = number(1, now);
        low.priority = 5;
        let mut old_high = number(2, now);
        old_high.preheated_at = Some(now - Duration::minutes(5));
        let new_high = number(3, now);

        let old_high_id = old_high.id;
        store.insert(low).await.unwrap();
        store.insert(old_high).await.unwrap();
        store.insert(new_high).await.unwrap();

        let claimed = store
            .claim_one(
                PoolFilter::new().status(NumberStatus::Available),
                ClaimOrder::PreheatedFirst,
                PoolUpdate::new().status(NumberStatus::Reserved),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(claimed.id, old_high_id);
        assert_eq!(claimed.status, NumberStatus::Reserved);
    }

    #[tokio::test]
    async fn test_claim_oldest_first_ignores_preheat_age() {
        let now = base_time();
        let store = InMemoryNumberPoolStore::new();

        let mut older = number(1, now);
        older.created_at = now - Duration::minutes(30);
        older.preheated_at = Some(now);
        let mut newer = number(2, now);
        newer.preheated_at = Some(now - Duration::minutes(30));

        let older_id = older.id;
        store.insert(older).await.unwrap();
        store.insert(newer).await.unwrap();

        let claimed = store
            .claim_one(
                PoolFilter::new().status(NumberStatus::Available),
                ClaimOrder::OldestFirst,
                PoolUpdate::new().status(NumberStatus::Reserved),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(claimed.id, older_id);
    }

    #[tokio::test]
    async fn test_claim_misses_when_nothing_matches() {
        let store = InMemoryNumberPoolStore::new();
        let claimed = store
            .claim_one(
                PoolFilter::new().status(NumberStatus::Available),
                ClaimOrder::PreheatedFirst,
                PoolUpdate::new().status(NumberStatus::Reserved),
            )
            .await
            .unwrap();
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_update_by_id_guard_detects_lost_race() {
        let now = base_time();
        let store = InMemoryNumberPoolStore::new();
        let mut row = number(1, now);
        row.status = NumberStatus::Reserved;
        let id = row.id;
        store.insert(row).await.unwrap();

        let updated = store
            .update_by_id(
                id,
                PoolFilter::new().status(NumberStatus::Reserved).used_count(0),
                PoolUpdate::new().status(NumberStatus::Used).bump_used_count(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, NumberStatus::Used);
        assert_eq!(updated.used_count, 1);

        // Guard no longer holds; the second writer loses.
        let lost = store
            .update_by_id(
                id,
                PoolFilter::new().status(NumberStatus::Reserved).used_count(0),
                PoolUpdate::new().status(NumberStatus::Used).bump_used_count(),
            )
            .await
            .unwrap();
        assert!(lost.is_none());

        let missing = store
            .update_by_id(
                PoolNumberId::new(),
                PoolFilter::new(),
                PoolUpdate::new().status(NumberStatus::Used),
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_where_and_count() {
        let now = base_time();
        let store = InMemoryNumberPoolStore::new();
        for seq in 0..3 {
            let mut row = number(seq, now);
            row.expires_at = now + Duration::minutes(seq as i64);
            store.insert(row).await.unwrap();
        }

        // Rows with seq 0 and 1 expire before now + 2min.
        let swept = store
            .update_where(
                PoolFilter::new()
                    .status(NumberStatus::Available)
                    .expires_before(now + Duration::minutes(2)),
                PoolUpdate::new().status(NumberStatus::Expired),
            )
            .await
            .unwrap();
        assert_eq!(swept, 2);

        let expired = store
            .count(PoolFilter::new().status(NumberStatus::Expired))
            .await
            .unwrap();
        let available = store
            .count(PoolFilter::new().status(NumberStatus::Available))
            .await
            .unwrap();
        assert_eq!(expired, 2);
        assert_eq!(available, 1);
    }

    #[tokio::test]
    async fn test_delete_where() {
        let now = base_time();
        let store = InMemoryNumberPoolStore::new();
        for seq in 0..4 {
            let mut row = number(seq, now);
            if seq < 3 {
                row.status = NumberStatus::Expired;
            }
            store.insert(row).await.unwrap();
        }

        let deleted = store
            .delete_where(PoolFilter::new().status(NumberStatus::Expired))
            .await
            .unwrap();

        assert_eq!(deleted, 3);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_find_many_sorts_oldest_first() {
        let now = base_time();
        let store = InMemoryNumberPoolStore::new();
        let mut order = Vec::new();
        for seq in 0..3 {
            let mut row = number(seq, now);
            row.created_at = now - Duration::minutes(seq as i64);
            order.push((row.created_at, row.id));
            store.insert(row).await.unwrap();
        }
        order.sort();

        let rows = store.find_many(PoolFilter::new()).await.unwrap();
        let got: Vec<_> = rows.iter().map(|row| (row.created_at, row.id)).collect();
        assert_eq!(got, order);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_never_double_issue() {
        let now = Utc::now();
        let store = Arc::new(InMemoryNumberPoolStore::new());
        for seq in 0..4 {
            store.insert(number(seq, now)).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .claim_one(
                        PoolFilter::new().status(NumberStatus::Available),
                        ClaimOrder::PreheatedFirst,
                        PoolUpdate::new()
                            .status(NumberStatus::Reserved)
                            .bump_reserved_count(),
                    )
                    .await
                    .unwrap()
            }));
        }

        let mut claimed = Vec::new();
        for handle in handles {
            if let Some(row) = handle.await.unwrap() {
                claimed.push(row.id);
            }
        }

        claimed.sort();
        claimed.dedup();
        assert_eq!(claimed.len(), 4, "each row must be claimed exactly once");
    }
}
