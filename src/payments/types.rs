//! Common types shared by all payment providers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical payment state, the unified vocabulary every provider-native
/// status token normalizes into. `Pending` is the only non-terminal state;
/// a transaction never regresses out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Success,
    Failed,
    Cancelled,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Success => "success",
            PaymentState::Failed => "failed",
            PaymentState::Cancelled => "cancelled",
        }
    }

    /// Parse a canonical token, case-insensitively. Returns `None` for
    /// anything outside the four-state vocabulary.
    pub fn from_canonical(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "pending" => Some(PaymentState::Pending),
            "success" => Some(PaymentState::Success),
            "failed" => Some(PaymentState::Failed),
            "cancelled" => Some(PaymentState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentState::Pending)
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Charge request handed to a driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Customer email address
    pub email: String,
    /// Amount in the major currency unit
    pub amount: Decimal,
    /// Three-letter currency code (NGN, GHS, USD, ...)
    pub currency: String,
    /// Globally unique reference correlating the charge, its verification
    /// and all webhook deliveries for it
    pub reference: String,
    /// Canonical payment channels to restrict the charge to, if any.
    /// Advisory: drivers omit the restriction for channels they cannot map.
    pub channels: Option<Vec<String>>,
    /// Callback URL to redirect after payment
    pub callback_url: Option<String>,
    /// Opaque metadata carried through to the provider
    pub metadata: Option<serde_json::Value>,
    /// Opaque customer details
    pub customer: Option<serde_json::Value>,
}

/// Result of a successful charge initiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResult {
    /// The provider that actually serviced the charge. May differ from the
    /// configured default when fallback occurred.
    pub provider: String,
    /// Transaction reference
    pub reference: String,
    /// Redirect URL for redirect-based payments
    pub authorization_url: Option<String>,
    /// Provider-side transaction identifier, if the provider assigns one
    pub provider_transaction_id: Option<String>,
    /// Provider-specific response data
    pub provider_data: Option<serde_json::Value>,
}

/// Result of a provider-side verification call. The provider's response is
/// the trusted source of truth for status and amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub reference: String,
    /// Provider-native status token, normalized by the caller
    pub raw_status: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    /// Provider-native channel token, if revealed
    pub channel: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Verification outcome as surfaced to callers, tagged with the provider
/// that answered and the canonical (or passed-through) status token.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedPayment {
    pub provider: String,
    pub reference: String,
    pub status: String,
    pub verification: VerificationResult,
}

/// Ephemeral reference -> provider routing entry, written on charge success
/// and consulted by verify/webhook paths. TTL-bounded by the session cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCacheEntry {
    pub provider: String,
    pub provider_transaction_id: Option<String>,
}

/// Canonical subscription status vocabulary for drivers that support
/// subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionStatus {
    Active,
    /// Still within its paid period but will not renew. Counts as active:
    /// the NON_RENEWING_COUNTS_AS_ACTIVE rule, preserved as an explicit
    /// business decision rather than a general "not cancelled" policy.
    NonRenewing,
    Attention,
    Completed,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::NonRenewing
        )
    }
}
