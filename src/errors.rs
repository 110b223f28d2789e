//! Error classification traits shared across the crate.

/// Trait for errors that can be classified as retryable or permanent.
///
/// This trait provides two levels of retryability classification:
///
/// 1. **Call-level** (`is_retryable`): Whether the same call should be
///    retried. Use this for transient errors like network timeouts, rate
///    limits, or a vendor briefly running out of stock.
///
/// 2. **Operation-level** (`should_retry_operation`): Whether a fresh attempt
///    (selecting a vendor again, purchasing a different number) might succeed
///    even though retrying the same call will not.
///
/// # Examples
///
/// ```rust
/// use sms_pool::RetryableError;
///
/// enum VendorError {
///     RequestTimeout,   // Retry the same call
///     NumberBanned,     // Don't retry the call, but a fresh number may work
///     InvalidApiKey,    // Don't retry at all
/// }
///
/// impl RetryableError for VendorError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, VendorError::RequestTimeout)
///     }
///
///     fn should_retry_operation(&self) -> bool {
///         match self {
///             VendorError::RequestTimeout => true,
///             VendorError::NumberBanned => true,
///             VendorError::InvalidApiKey => false,
///         }
///     }
/// }
/// ```
pub trait RetryableError {
    /// Returns true if this error represents a transient failure
    /// that might succeed on retry of the same call.
    ///
    /// Examples: network timeouts, rate limits, temporary vendor
    /// unavailability.
    fn is_retryable(&self) -> bool;

    /// Returns true if a fresh operation might succeed.
    ///
    /// Useful when one specific purchase failed (e.g. the number was
    /// rejected) but running vendor selection again could work.
    ///
    /// Default implementation returns the same as `is_retryable()`.
    fn should_retry_operation(&self) -> bool {
        self.is_retryable()
    }
}
