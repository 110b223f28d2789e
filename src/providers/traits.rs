//! Vendor adapter contract.

use super::error::ProviderError;
use crate::types::{ActivationId, CountryCode, PhoneNumber, ServiceCode, VendorName};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

// =============================================================================
// Wire value types
// =============================================================================

/// Phone number purchased from a vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedNumber {
    /// Vendor-side activation backing the purchase.
    pub activation_id: ActivationId,
    /// Full phone number with dial code.
    pub phone_number: PhoneNumber,
    /// Purchase cost in the vendor's account currency.
    pub cost: f64,
}

/// Activation progress as reported by the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationPhase {
    /// Number issued, SMS not yet received.
    Waiting,
    /// SMS received; the code is available.
    Received,
    /// Activation was cancelled on the vendor side.
    Cancelled,
    /// Vendor reported a state this crate does not model.
    Unknown,
}

impl Display for ActivationPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivationPhase::Waiting => "waiting",
            ActivationPhase::Received => "received",
            ActivationPhase::Cancelled => "cancelled",
            ActivationPhase::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Status snapshot for one activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationState {
    /// Coarse activation phase.
    pub phase: ActivationPhase,
    /// Received SMS code, when `phase` is [`ActivationPhase::Received`].
    pub code: Option<String>,
    /// Vendor-provided detail message.
    pub message: Option<String>,
}

/// State transition a caller can request for an activation.
///
/// Wire codes follow the SMS-Activate protocol family, which most vendors
/// in this space speak or emulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationCommand {
    /// Number is ready to receive SMS.
    NotifyReady,
    /// Ask for one more code on the same number.
    RequestAnotherCode,
    /// Activation completed successfully.
    Finish,
    /// Cancel the activation.
    Cancel,
}

impl ActivationCommand {
    /// Numeric wire code for this command.
    pub fn code(&self) -> u8 {
        match self {
            ActivationCommand::NotifyReady => 1,
            ActivationCommand::RequestAnotherCode => 3,
            ActivationCommand::Finish => 6,
            ActivationCommand::Cancel => 8,
        }
    }
}

/// Vendor account balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBalance {
    /// Remaining balance.
    pub balance: f64,
    /// Currency code as reported by the vendor.
    pub currency: String,
}

// =============================================================================
// SmsProvider
// =============================================================================

/// Contract every SMS vendor adapter implements.
///
/// Adapters are registered in a
/// [`ProviderRegistry`](super::registry::ProviderRegistry) and resolved by
/// vendor name at selection time, so the trait is object-safe and shared
/// behind `Arc<dyn SmsProvider>`.
///
/// # Example
///
/// ```rust,ignore
/// use sms_pool::providers::{ProviderError, ProvisionedNumber, SmsProvider};
///
/// struct MyVendor {
///     vendor: VendorName,
///     client: MyHttpClient,
/// }
///
/// #[async_trait::async_trait]
/// impl SmsProvider for MyVendor {
///     fn vendor(&self) -> &VendorName {
///         &self.vendor
///     }
///
///     async fn get_number(
///         &self,
///         service: &ServiceCode,
///         country: &CountryCode,
///     ) -> Result<ProvisionedNumber, ProviderError> {
///         // Call the vendor API and map the response
///     }
///
///     // ... remaining operations
/// }
/// ```
#[async_trait::async_trait]
pub trait SmsProvider: Send + Sync {
    /// Vendor this adapter talks to.
    fn vendor(&self) -> &VendorName;

    /// Purchase a number for the given service and country.
    async fn get_number(
        &self,
        service: &ServiceCode,
        country: &CountryCode,
    ) -> Result<ProvisionedNumber, ProviderError>;

    /// Fetch the current activation state.
    async fn get_status(
        &self,
        activation_id: &ActivationId,
    ) -> Result<ActivationState, ProviderError>;

    /// Cancel the activation and release the number on the vendor side.
    async fn cancel(&self, activation_id: &ActivationId) -> Result<(), ProviderError>;

    /// Request an activation state transition.
    async fn set_status(
        &self,
        activation_id: &ActivationId,
        command: ActivationCommand,
    ) -> Result<(), ProviderError>;

    /// Current account balance.
    async fn get_balance(&self) -> Result<ProviderBalance, ProviderError>;

    /// Probe vendor availability.
    ///
    /// The default probe asks for the account balance and treats any error
    /// as an unhealthy vendor.
    async fn health_check(&self) -> bool {
        self.get_balance().await.is_ok()
    }
}
