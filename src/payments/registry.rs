//! Provider registry
//!
//! Holds the configured drivers by name. Resolution failures are caller or
//! configuration errors and never fall back: an unknown provider name or a
//! missing capability is a permanent mismatch, not a transient fault.

use std::collections::HashMap;
use std::sync::Arc;

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::traits::{Driver, SupportsSubscriptions};

#[derive(Default)]
pub struct ProviderRegistry {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its own name. Replaces any driver previously
    /// registered under the same name.
    pub fn register(&mut self, driver: Arc<dyn Driver>) {
        self.drivers
            .insert(driver.name().to_ascii_lowercase(), driver);
    }

    /// Resolve a provider name to its driver. Fails with `DriverNotFound`
    /// for unconfigured names.
    pub fn resolve(&self, name: &str) -> PaymentResult<Arc<dyn Driver>> {
        self.drivers
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| PaymentError::driver_not_found(name))
    }

    /// Resolve a provider and require its subscription capability. Fails
    /// with `UnsupportedCapability` when the driver does not implement it.
    pub fn require_subscriptions<'a>(
        &'a self,
        name: &str,
    ) -> PaymentResult<&'a dyn SupportsSubscriptions> {
        let driver = self
            .drivers
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| PaymentError::driver_not_found(name))?;

        driver
            .subscriptions()
            .ok_or_else(|| PaymentError::UnsupportedCapability {
                provider: driver.name().to_string(),
                capability: "subscriptions",
            })
    }

    pub fn configured_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_configured(&self, name: &str) -> bool {
        self.drivers.contains_key(&name.to_ascii_lowercase())
    }
}
