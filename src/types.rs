//! Core domain types for vendor routing and number pooling.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// VendorName
// =============================================================================

/// Name of an upstream SMS vendor (e.g. "sms-activate", "5sim").
///
/// Vendor names key the adapter registry and the performance tracker, and
/// appear in persisted vendor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VendorName(String);

impl VendorName {
    /// Create a new VendorName from a string.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for VendorName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for VendorName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for VendorName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&str> for VendorName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

// =============================================================================
// ServiceCode
// =============================================================================

/// Short code of the service a number receives SMS for (e.g. "tg", "wa").
///
/// Codes are normalized to ASCII lowercase so lookups and filters never
/// miss on casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceCode(String);

impl ServiceCode {
    /// Create a new ServiceCode, normalizing to lowercase.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_lowercase())
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ServiceCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ServiceCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ServiceCode {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<&str> for ServiceCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

// =============================================================================
// CountryCode
// =============================================================================

/// Country designator used by vendor APIs (e.g. "RU", "US").
///
/// Normalized to ASCII uppercase. Kept free-form because vendors disagree on
/// the exact alphabet (ISO alpha-2 vs numeric vendor ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CountryCode(String);

impl CountryCode {
    /// Create a new CountryCode, normalizing to uppercase.
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CountryCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CountryCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for CountryCode {
    fn from(code: String) -> Self {
        Self::new(code)
    }
}

impl From<&str> for CountryCode {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

// =============================================================================
// PhoneNumber
// =============================================================================

/// Full phone number with country code, as returned by a vendor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Create a new PhoneNumber.
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Get the number as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PhoneNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for PhoneNumber {
    fn from(number: String) -> Self {
        Self(number)
    }
}

impl From<&str> for PhoneNumber {
    fn from(number: &str) -> Self {
        Self(number.to_string())
    }
}

// =============================================================================
// ActivationId
// =============================================================================

/// Vendor-side identifier of an activation.
///
/// Returned when a number is purchased and used for every follow-up call
/// about that number (status polling, cancellation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivationId(String);

impl ActivationId {
    /// Create a new ActivationId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ActivationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ActivationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for ActivationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ActivationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// =============================================================================
// CallerId
// =============================================================================

/// Identifier of the caller holding a pool reservation (a device, a session,
/// a tenant - whatever the embedding service uses).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerId(String);

impl CallerId {
    /// Create a new CallerId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CallerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CallerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for CallerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CallerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// =============================================================================
// PoolNumberId
// =============================================================================

/// Primary key of a pooled-number record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolNumberId(Uuid);

impl PoolNumberId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PoolNumberId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PoolNumberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PoolNumberId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for PoolNumberId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
