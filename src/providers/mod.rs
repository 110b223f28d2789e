//! Vendor adapter contract, registry and retry decoration.
//!
//! An adapter speaks one vendor's API and implements [`SmsProvider`]. Adapters
//! are collected in a [`ProviderRegistry`] keyed by vendor name; selection and
//! pooling resolve vendors through the registry and never talk to a concrete
//! adapter type. Wrap an adapter in [`RetryingProvider`] to retry transient
//! failures with exponential backoff.

pub(crate) mod error;
pub(crate) mod registry;
pub(crate) mod retryable;
pub(crate) mod traits;

pub use error::ProviderError;
pub use registry::ProviderRegistry;
pub use retryable::{OnRetryCallback, RetryConfig, RetryingProvider};
pub use traits::{
    ActivationCommand, ActivationPhase, ActivationState, ProviderBalance, ProvisionedNumber,
    SmsProvider,
};
