//! Status and channel normalization tables
//!
//! Every provider speaks its own status and channel vocabulary. Both
//! normalizers here are data-driven lookup tables keyed by
//! `(provider, token)`: supporting a new provider means adding rows, not
//! editing logic.

use std::collections::HashMap;

use tracing::warn;

use crate::payments::types::PaymentState;

/// Default `(provider, raw_token) -> canonical state` rows.
const STATUS_ROWS: &[(&str, &str, PaymentState)] = &[
    // paystack
    ("paystack", "success", PaymentState::Success),
    ("paystack", "pending", PaymentState::Pending),
    ("paystack", "processing", PaymentState::Pending),
    ("paystack", "ongoing", PaymentState::Pending),
    ("paystack", "failed", PaymentState::Failed),
    ("paystack", "abandoned", PaymentState::Failed),
    ("paystack", "reversed", PaymentState::Cancelled),
    // stripe
    ("stripe", "succeeded", PaymentState::Success),
    ("stripe", "processing", PaymentState::Pending),
    ("stripe", "requires_confirmation", PaymentState::Pending),
    ("stripe", "requires_action", PaymentState::Pending),
    ("stripe", "requires_payment_method", PaymentState::Pending),
    ("stripe", "payment_failed", PaymentState::Failed),
    ("stripe", "canceled", PaymentState::Cancelled),
    // flutterwave
    ("flutterwave", "successful", PaymentState::Success),
    ("flutterwave", "pending", PaymentState::Pending),
    ("flutterwave", "failed", PaymentState::Failed),
    ("flutterwave", "cancelled", PaymentState::Cancelled),
    // paypal: a completed capture reports "approved"
    ("paypal", "approved", PaymentState::Success),
    ("paypal", "completed", PaymentState::Success),
    ("paypal", "created", PaymentState::Pending),
    ("paypal", "open", PaymentState::Pending),
    ("paypal", "denied", PaymentState::Failed),
    ("paypal", "expired", PaymentState::Failed),
    ("paypal", "voided", PaymentState::Cancelled),
    // mpesa
    ("mpesa", "completed", PaymentState::Success),
    ("mpesa", "paid", PaymentState::Success),
    ("mpesa", "pending", PaymentState::Pending),
    ("mpesa", "declined", PaymentState::Failed),
    ("mpesa", "cancelled", PaymentState::Cancelled),
];

/// Maps provider-native status tokens to the canonical four-state
/// vocabulary. Lookup is case-insensitive. Unmapped tokens pass through
/// unchanged: an unknown provider token must never be silently coerced into
/// `success` or `failed`.
#[derive(Debug, Clone)]
pub struct StatusNormalizer {
    rows: HashMap<(String, String), PaymentState>,
}

impl StatusNormalizer {
    /// Empty table, for hosts that load rows from their own source.
    pub fn empty() -> Self {
        Self {
            rows: HashMap::new(),
        }
    }

    /// Table pre-populated with the built-in provider rows.
    pub fn with_defaults() -> Self {
        let mut normalizer = Self::empty();
        for (provider, token, state) in STATUS_ROWS {
            normalizer.add_row(provider, token, *state);
        }
        normalizer
    }

    /// Register one `(provider, raw_token) -> canonical` row.
    pub fn add_row(&mut self, provider: &str, raw_token: &str, state: PaymentState) {
        self.rows.insert(
            (provider.to_ascii_lowercase(), raw_token.to_ascii_lowercase()),
            state,
        );
    }

    /// Normalize a provider-native status token. Returns the canonical token
    /// when a row matches, otherwise the raw token unchanged.
    pub fn normalize(&self, raw_status: &str, provider: &str) -> String {
        match self.lookup(raw_status, provider) {
            Some(state) => state.as_str().to_string(),
            None => {
                warn!(
                    provider = provider,
                    raw_status = raw_status,
                    "unmapped provider status token, passing through"
                );
                raw_status.to_string()
            }
        }
    }

    /// Table lookup without passthrough, for callers that need to know
    /// whether the token mapped at all.
    pub fn lookup(&self, raw_status: &str, provider: &str) -> Option<PaymentState> {
        self.rows
            .get(&(
                provider.to_ascii_lowercase(),
                raw_status.to_ascii_lowercase(),
            ))
            .copied()
    }
}

impl Default for StatusNormalizer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Default `(provider, canonical) -> provider tokens` rows. A canonical
/// channel may fan out to several provider-native tokens.
const CHANNEL_ROWS: &[(&str, &str, &[&str])] = &[
    ("paystack", "card", &["card"]),
    ("paystack", "bank_transfer", &["bank", "banktransfer"]),
    ("paystack", "ussd", &["ussd"]),
    ("paystack", "mobile_money", &["mobile_money"]),
    ("paystack", "qr", &["qr"]),
    ("stripe", "card", &["card"]),
    ("stripe", "bank_transfer", &["us_bank_account", "sepa_debit"]),
    ("flutterwave", "card", &["card"]),
    ("flutterwave", "bank_transfer", &["banktransfer"]),
    ("flutterwave", "ussd", &["ussd"]),
    ("flutterwave", "mobile_money", &["mobilemoney"]),
    ("mpesa", "mobile_money", &["mpesa"]),
];

/// Bidirectional canonical/provider channel mapping. Channel filtering is
/// advisory: an unknown mapping returns `None` and the caller omits the
/// restriction rather than failing.
#[derive(Debug, Clone)]
pub struct ChannelMapper {
    to_provider: HashMap<(String, String), Vec<String>>,
    from_provider: HashMap<(String, String), String>,
}

impl ChannelMapper {
    pub fn empty() -> Self {
        Self {
            to_provider: HashMap::new(),
            from_provider: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut mapper = Self::empty();
        for (provider, canonical, tokens) in CHANNEL_ROWS {
            mapper.add_row(provider, canonical, tokens);
        }
        mapper
    }

    /// Register one canonical channel row with its provider-native tokens.
    pub fn add_row(&mut self, provider: &str, canonical: &str, tokens: &[&str]) {
        let provider = provider.to_ascii_lowercase();
        let canonical = canonical.to_ascii_lowercase();

        self.to_provider.insert(
            (provider.clone(), canonical.clone()),
            tokens.iter().map(|t| t.to_string()).collect(),
        );
        for token in tokens {
            self.from_provider.insert(
                (provider.clone(), token.to_ascii_lowercase()),
                canonical.clone(),
            );
        }
    }

    /// Provider-native tokens for a canonical channel, or `None` when the
    /// provider has no equivalent.
    pub fn to_provider_tokens(&self, canonical: &str, provider: &str) -> Option<Vec<String>> {
        self.to_provider
            .get(&(
                provider.to_ascii_lowercase(),
                canonical.to_ascii_lowercase(),
            ))
            .cloned()
    }

    /// Canonical channel for a provider-native token, or `None` when
    /// unmapped.
    pub fn from_provider_token(&self, token: &str, provider: &str) -> Option<String> {
        self.from_provider
            .get(&(provider.to_ascii_lowercase(), token.to_ascii_lowercase()))
            .cloned()
    }
}

impl Default for ChannelMapper {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_known_tokens_case_insensitively() {
        let normalizer = StatusNormalizer::with_defaults();
        assert_eq!(normalizer.normalize("SUCCESS", "paystack"), "success");
        assert_eq!(normalizer.normalize("Succeeded", "stripe"), "success");
        assert_eq!(normalizer.normalize("requires_action", "stripe"), "pending");
        assert_eq!(normalizer.normalize("voided", "PayPal"), "cancelled");
    }

    #[test]
    fn unmapped_token_passes_through_unchanged() {
        let normalizer = StatusNormalizer::with_defaults();
        assert_eq!(
            normalizer.normalize("WEIRD_TOKEN", "paystack"),
            "WEIRD_TOKEN"
        );
        assert_eq!(normalizer.lookup("WEIRD_TOKEN", "paystack"), None);
    }

    #[test]
    fn same_token_maps_per_provider() {
        let normalizer = StatusNormalizer::with_defaults();
        // "approved" is a paypal capture success, not a paystack token
        assert_eq!(normalizer.normalize("approved", "paypal"), "success");
        assert_eq!(normalizer.normalize("approved", "paystack"), "approved");
    }

    #[test]
    fn adding_a_provider_is_a_data_change() {
        let mut normalizer = StatusNormalizer::with_defaults();
        normalizer.add_row("newpay", "ok", PaymentState::Success);
        assert_eq!(normalizer.normalize("OK", "newpay"), "success");
    }

    #[test]
    fn canonical_channel_fans_out_to_provider_tokens() {
        let mapper = ChannelMapper::with_defaults();
        assert_eq!(
            mapper.to_provider_tokens("bank_transfer", "paystack"),
            Some(vec!["bank".to_string(), "banktransfer".to_string()])
        );
    }

    #[test]
    fn unknown_channel_mapping_is_none_not_error() {
        let mapper = ChannelMapper::with_defaults();
        assert_eq!(mapper.to_provider_tokens("crypto", "paystack"), None);
        assert_eq!(mapper.from_provider_token("lightning", "stripe"), None);
    }

    #[test]
    fn provider_token_maps_back_to_canonical() {
        let mapper = ChannelMapper::with_defaults();
        assert_eq!(
            mapper.from_provider_token("banktransfer", "paystack"),
            Some("bank_transfer".to_string())
        );
        assert_eq!(
            mapper.from_provider_token("us_bank_account", "stripe"),
            Some("bank_transfer".to_string())
        );
    }
}
