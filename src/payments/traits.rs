//! Driver capability traits
//!
//! A `Driver` is the capability-set adapter for one payment provider. The
//! provider-specific HTTP/SDK calls live behind this interface; the engine
//! only consumes the capabilities declared here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::HeaderMap;

use crate::payments::error::ProviderError;
use crate::payments::types::{ChargeRequest, ChargeResult, SubscriptionStatus, VerificationResult};

/// Capability interface implemented once per configured provider.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Provider name this driver is registered under ("paystack", "stripe").
    fn name(&self) -> &str;

    /// Initiate a charge with the provider.
    ///
    /// Errors carry a tagged kind: `Transient` advances the fallback chain,
    /// everything else stops it.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeResult, ProviderError>;

    /// Look up the current provider-side state of a charge.
    async fn verify(&self, reference: &str) -> Result<VerificationResult, ProviderError>;

    /// Validate a webhook delivery against the provider's signing scheme.
    ///
    /// Must fail closed: a missing secret, absent header or digest mismatch
    /// all return `false`.
    fn validate_webhook_signature(&self, headers: &HeaderMap, raw_body: &[u8]) -> bool;

    /// Extract the transaction reference from a webhook payload, if present.
    fn extract_webhook_reference(&self, payload: &serde_json::Value) -> Option<String>;

    /// Extract the provider-native status token from a webhook payload.
    fn extract_webhook_status(&self, payload: &serde_json::Value) -> String;

    /// Extract the provider-native channel token, if the payload reveals one.
    fn extract_webhook_channel(&self, payload: &serde_json::Value) -> Option<String>;

    /// Extract an embedded event timestamp for replay checks. Providers whose
    /// payloads never carry one keep the default.
    fn extract_webhook_timestamp(&self, _payload: &serde_json::Value) -> Option<DateTime<Utc>> {
        None
    }

    /// Probe provider availability. Advisory only; never gates a charge.
    async fn health_check(&self) -> bool;

    /// Optional subscription capability. Drivers that support subscriptions
    /// return `Some(self)`.
    fn subscriptions(&self) -> Option<&dyn SupportsSubscriptions> {
        None
    }
}

/// Optional capability for providers with native subscription support.
#[async_trait]
pub trait SupportsSubscriptions: Send + Sync {
    /// Current status of a provider-side subscription.
    async fn subscription_status(
        &self,
        subscription_code: &str,
    ) -> Result<SubscriptionStatus, ProviderError>;

    /// Stop a subscription from renewing.
    async fn cancel_subscription(&self, subscription_code: &str) -> Result<(), ProviderError>;
}
