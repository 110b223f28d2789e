//! Vendor adapter registry.

use super::traits::SmsProvider;
use crate::types::VendorName;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps vendor names to adapter instances.
///
/// Built once at startup and shared behind an `Arc`. Selection resolves the
/// vendor name stored in configuration to the adapter registered here.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<VendorName, Arc<dyn SmsProvider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("vendors", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own vendor name, replacing any previous
    /// registration for that vendor.
    pub fn register(&mut self, provider: Arc<dyn SmsProvider>) {
        self.providers.insert(provider.vendor().clone(), provider);
    }

    /// Fluent registration for building a registry inline.
    pub fn with(mut self, provider: Arc<dyn SmsProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Resolve an adapter by vendor name.
    pub fn get(&self, vendor: &VendorName) -> Option<Arc<dyn SmsProvider>> {
        self.providers.get(vendor).cloned()
    }

    /// Whether the vendor has a registered adapter.
    pub fn contains(&self, vendor: &VendorName) -> bool {
        self.providers.contains_key(vendor)
    }

    /// Registered vendor names.
    pub fn names(&self) -> Vec<VendorName> {
        self.providers.keys().cloned().collect()
    }

    /// Number of registered adapters.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::error::ProviderError;
    use crate::providers::traits::{
        ActivationCommand, ActivationState, ProviderBalance, ProvisionedNumber,
    };
    use crate::types::{ActivationId, CountryCode, ServiceCode};

    struct StubProvider {
        vendor: VendorName,
    }

    impl StubProvider {
        fn new(vendor: &str) -> Arc<dyn SmsProvider> {
            Arc::new(Self {
                vendor: VendorName::from(vendor),
            })
        }
    }

    #[async_trait::async_trait]
    impl SmsProvider for StubProvider {
        fn vendor(&self) -> &VendorName {
            &self.vendor
        }

        async fn get_number(
            &self,
            _service: &ServiceCode,
            _country: &CountryCode,
        ) -> Result<ProvisionedNumber, ProviderError> {
            Err(ProviderError::no_numbers(self.vendor.clone()))
        }

        async fn get_status(
            &self,
            _activation_id: &ActivationId,
        ) -> Result<ActivationState, ProviderError> {
            Err(ProviderError::request_failed(self.vendor.clone(), "stub"))
        }

        async fn cancel(&self, _activation_id: &ActivationId) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn set_status(
            &self,
            _activation_id: &ActivationId,
            _command: ActivationCommand,
        ) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn get_balance(&self) -> Result<ProviderBalance, ProviderError> {
            Ok(ProviderBalance {
                balance: 10.0,
                currency: "USD".to_string(),
            })
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = ProviderRegistry::new()
            .with(StubProvider::new("sms-activate"))
            .with(StubProvider::new("5sim"));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(&VendorName::from("5sim")));

        let adapter = registry.get(&VendorName::from("sms-activate")).unwrap();
        assert_eq!(adapter.vendor().as_str(), "sms-activate");
    }

    #[test]
    fn test_missing_vendor() {
        let registry = ProviderRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(&VendorName::from("nope")).is_none());
    }

    #[test]
    fn test_reregister_replaces() {
        let mut registry = ProviderRegistry::new();
        registry.register(StubProvider::new("sms-activate"));
        registry.register(StubProvider::new("sms-activate"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_default_health_check_uses_balance() {
        let adapter = StubProvider::new("sms-activate");
        assert!(adapter.health_check().await);
    }
}
