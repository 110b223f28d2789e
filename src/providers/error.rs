//! Vendor adapter error type.

use crate::errors::RetryableError;
use crate::types::VendorName;
use std::time::Duration;
use thiserror::Error;

/// Error raised by a vendor adapter call.
///
/// Carries the context routing needs: which vendor failed, a vendor-level
/// error code, and whether retrying the same call can succeed. Adapters map
/// their wire-specific failures into this shape.
#[derive(Debug, Clone, Error)]
#[error("sms vendor error [{vendor}/{code}]: {message}")]
pub struct ProviderError {
    /// Vendor that produced the error.
    pub vendor: VendorName,
    /// Vendor-level error code (e.g. "NO_NUMBERS", "NO_BALANCE").
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Whether retrying the same call may succeed.
    pub retryable: bool,
}

impl ProviderError {
    /// Create an error with an explicit code and classification.
    pub fn new(
        vendor: VendorName,
        code: impl Into<String>,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            vendor,
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Transient transport or vendor-side failure.
    pub fn request_failed(vendor: VendorName, message: impl Into<String>) -> Self {
        Self::new(vendor, "REQUEST_FAILED", message, true)
    }

    /// Vendor has no numbers in stock for the requested service/country.
    pub fn no_numbers(vendor: VendorName) -> Self {
        Self::new(vendor, "NO_NUMBERS", "no numbers available", true)
    }

    /// Vendor account balance is too low to purchase.
    pub fn no_balance(vendor: VendorName) -> Self {
        Self::new(vendor, "NO_BALANCE", "insufficient account balance", true)
    }

    /// Call exceeded its allotted time.
    pub fn timeout(vendor: VendorName, elapsed: Duration) -> Self {
        Self::new(
            vendor,
            "TIMEOUT",
            format!("call timed out after {:.1}s", elapsed.as_secs_f64()),
            true,
        )
    }

    /// Permanent failure; retrying cannot help (bad key, malformed request).
    pub fn permanent(
        vendor: VendorName,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(vendor, code, message, false)
    }
}

impl RetryableError for ProviderError {
    fn is_retryable(&self) -> bool {
        self.retryable
    }
}
