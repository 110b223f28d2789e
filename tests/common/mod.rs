//! Shared fixtures for the integration suites.

#![allow(dead_code)]

use sms_pool::providers::{
    ActivationCommand, ActivationPhase, ActivationState, ProviderBalance, ProviderError,
    ProvisionedNumber, SmsProvider,
};
use sms_pool::types::{ActivationId, CountryCode, PhoneNumber, ServiceCode, VendorName};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Scriptable vendor adapter.
///
/// Every `get_number` call succeeds with a sequential phone number unless a
/// failure has been scripted for it; scripted failures are consumed in
/// order, ahead of the default success. Optional latency simulates a slow
/// vendor for timeout coverage.
pub struct MockSmsProvider {
    vendor: VendorName,
    cost: f64,
    latency: Option<Duration>,
    healthy: AtomicBool,
    calls: AtomicU32,
    scripted: Mutex<VecDeque<ProviderError>>,
}

impl MockSmsProvider {
    /// Adapter succeeding on every call at a cost of 0.10.
    pub fn new(vendor: &str) -> Self {
        Self::with_cost(vendor, 0.10)
    }

    /// Adapter succeeding on every call at the given cost.
    pub fn with_cost(vendor: &str, cost: f64) -> Self {
        Self {
            vendor: VendorName::from(vendor),
            cost,
            latency: None,
            healthy: AtomicBool::new(true),
            calls: AtomicU32::new(0),
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    /// Make every call take `latency` before resolving.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Script transient failures for the next `count` calls.
    pub fn fail_next(&self, count: u32) {
        let mut scripted = self.scripted.lock().unwrap();
        for _ in 0..count {
            scripted.push_back(ProviderError::request_failed(
                self.vendor.clone(),
                "scripted failure",
            ));
        }
    }

    /// Script a specific failure for the next call.
    pub fn push_failure(&self, error: ProviderError) {
        self.scripted.lock().unwrap().push_back(error);
    }

    /// Set the verdict future health probes report.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// How many `get_number` calls the adapter has seen.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The adapter's vendor name.
    pub fn name(&self) -> VendorName {
        self.vendor.clone()
    }
}

#[async_trait::async_trait]
impl SmsProvider for MockSmsProvider {
    fn vendor(&self) -> &VendorName {
        &self.vendor
    }

    async fn get_number(
        &self,
        _service: &ServiceCode,
        _country: &CountryCode,
    ) -> Result<ProvisionedNumber, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.scripted.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(ProvisionedNumber {
            activation_id: ActivationId::from(format!("{}-act-{call}", self.vendor)),
            phone_number: PhoneNumber::from(format!("7900{call:07}")),
            cost: self.cost,
        })
    }

    async fn get_status(
        &self,
        _activation_id: &ActivationId,
    ) -> Result<ActivationState, ProviderError> {
        Ok(ActivationState {
            phase: ActivationPhase::Waiting,
            code: None,
            message: None,
        })
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
            balance: 25.0,
            currency: "USD".to_string(),
        })
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// Poll `predicate` until it holds, panicking after roughly one second.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition was not met in time");
}
