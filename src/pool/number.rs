//! Pooled phone number record.

use crate::providers::ProvisionedNumber;
use crate::types::{
    ActivationId, CallerId, CountryCode, PhoneNumber, PoolNumberId, ServiceCode, VendorName,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Lifecycle state of a pooled number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberStatus {
    /// Ready to be handed out.
    Available,
    /// Claimed by a caller and in use.
    Reserved,
    /// Served a verification; waiting out the reuse cooldown.
    Used,
    /// Past its lifetime; kept briefly for observability, then purged.
    Expired,
}

impl Display for NumberStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            NumberStatus::Available => "available",
            NumberStatus::Reserved => "reserved",
            NumberStatus::Used => "used",
            NumberStatus::Expired => "expired",
        };
        write!(f, "{s}")
    }
}

/// A vendor-purchased phone number held in the pool.
///
/// Records move `Available -> Reserved -> Used -> Available` across reuse
/// cycles until the reuse budget runs out or the lifetime lapses, at which
/// point they become `Expired` and are eventually purged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledNumber {
    /// Pool-local identifier.
    pub id: PoolNumberId,
    /// Vendor the number was purchased from.
    pub vendor: VendorName,
    /// Vendor-side activation backing the purchase.
    pub vendor_activation_id: ActivationId,
    /// The phone number itself.
    pub phone_number: PhoneNumber,
    /// Country the number belongs to.
    pub country_code: CountryCode,
    /// Service the number was provisioned for.
    pub service_code: ServiceCode,
    /// Purchase cost.
    pub cost: f64,
    /// Current lifecycle state.
    pub status: NumberStatus,
    /// Caller holding the reservation, while `status` is `Reserved`.
    pub reserved_by: Option<CallerId>,
    /// When the current reservation was taken.
    pub reserved_at: Option<DateTime<Utc>>,
    /// Whether the number was provisioned ahead of demand.
    pub preheated: bool,
    /// When the number was preheated.
    pub preheated_at: Option<DateTime<Utc>>,
    /// Claim precedence; higher values are handed out first.
    pub priority: i32,
    /// How many times the number has been reserved.
    pub reserved_count: u32,
    /// How many times the number has served a verification.
    pub used_count: u32,
    /// When the record entered the pool.
    pub created_at: DateTime<Utc>,
    /// When the current lifetime or cooldown window lapses.
    pub expires_at: DateTime<Utc>,
}

impl PooledNumber {
    /// Build a freshly preheated record from a vendor purchase.
    pub fn preheated(
        vendor: VendorName,
        provisioned: ProvisionedNumber,
        service_code: ServiceCode,
        country_code: CountryCode,
        priority: i32,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PoolNumberId::new(),
            vendor,
            vendor_activation_id: provisioned.activation_id,
            phone_number: provisioned.phone_number,
            country_code,
            service_code,
            cost: provisioned.cost,
            status: NumberStatus::Available,
            reserved_by: None,
            reserved_at: None,
            preheated: true,
            preheated_at: Some(now),
            priority,
            reserved_count: 0,
            used_count: 0,
            created_at: now,
            expires_at,
        }
    }

    /// Whether the record's window has lapsed as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn provisioned() -> ProvisionedNumber {
        ProvisionedNumber {
            activation_id: ActivationId::from("act-42"),
            phone_number: PhoneNumber::from("79000000042"),
            cost: 0.11,
        }
    }

    #[test]
    fn test_preheated_record() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let expires_at = now + Duration::minutes(20);

        let number = PooledNumber::preheated(
            VendorName::from("sms-activate"),
            provisioned(),
            ServiceCode::from("tg"),
            CountryCode::from("US"),
            10,
            now,
            expires_at,
        );

        assert_eq!(number.status, NumberStatus::Available);
        assert!(number.preheated);
        assert_eq!(number.preheated_at, Some(now));
        assert_eq!(number.priority, 10);
        assert_eq!(number.reserved_count, 0);
        assert_eq!(number.used_count, 0);
        assert_eq!(number.expires_at, expires_at);
        assert!(number.reserved_by.is_none());
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let number = PooledNumber::preheated(
            VendorName::from("sms-activate"),
            provisioned(),
            ServiceCode::from("tg"),
            CountryCode::from("US"),
            10,
            now,
            now + Duration::minutes(20),
        );

        assert!(!number.is_expired_at(now));
        assert!(!number.is_expired_at(now + Duration::minutes(19)));
        assert!(number.is_expired_at(now + Duration::minutes(20)));
        assert!(number.is_expired_at(now + Duration::minutes(21)));
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&NumberStatus::Reserved).unwrap();
        assert_eq!(json, "\"reserved\"");
        let parsed: NumberStatus = serde_json::from_str("\"used\"").unwrap();
        assert_eq!(parsed, NumberStatus::Used);
        assert_eq!(NumberStatus::Available.to_string(), "available");
    }
}
