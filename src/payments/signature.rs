//! Webhook signature schemes
//!
//! Each provider signs webhook deliveries differently; drivers pick the
//! scheme that matches their provider and call [`SignatureScheme::verify`]
//! from their `validate_webhook_signature` capability. All schemes fail
//! closed: missing secret, absent header or digest mismatch reject the
//! delivery.

use base64::Engine;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use sha2::{Sha256, Sha512};

type HmacSha512 = Hmac<Sha512>;
type HmacSha256 = Hmac<Sha256>;

/// Provider webhook signing scheme.
#[derive(Debug, Clone)]
pub enum SignatureScheme {
    /// HMAC-SHA512 over the raw body, hex-encoded in the named header
    /// (Paystack style, `x-paystack-signature`).
    HmacSha512Hex { header: String },
    /// HMAC-SHA256 over the raw body, base64-encoded in the named header
    /// (Flutterwave style).
    HmacSha256Base64 { header: String },
    /// No digest; the named header must carry the configured secret verbatim
    /// (shared-token providers).
    HeaderPresence { header: String },
}

impl SignatureScheme {
    pub fn hmac_sha512_hex(header: impl Into<String>) -> Self {
        Self::HmacSha512Hex {
            header: header.into(),
        }
    }

    pub fn hmac_sha256_base64(header: impl Into<String>) -> Self {
        Self::HmacSha256Base64 {
            header: header.into(),
        }
    }

    pub fn header_presence(header: impl Into<String>) -> Self {
        Self::HeaderPresence {
            header: header.into(),
        }
    }

    /// Verify a delivery. `secret` is the provider signing secret; `None`
    /// means the secret is not configured and every delivery is rejected.
    pub fn verify(&self, secret: Option<&str>, headers: &HeaderMap, raw_body: &[u8]) -> bool {
        let Some(secret) = secret else {
            return false;
        };

        let header_name = match self {
            SignatureScheme::HmacSha512Hex { header } => header,
            SignatureScheme::HmacSha256Base64 { header } => header,
            SignatureScheme::HeaderPresence { header } => header,
        };

        let Some(provided) = headers.get(header_name).and_then(|v| v.to_str().ok()) else {
            return false;
        };
        let provided = provided.trim();

        let expected = match self {
            SignatureScheme::HmacSha512Hex { .. } => {
                let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
                    Ok(mac) => mac,
                    Err(_) => return false,
                };
                mac.update(raw_body);
                hex::encode(mac.finalize().into_bytes())
            }
            SignatureScheme::HmacSha256Base64 { .. } => {
                let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
                    Ok(mac) => mac,
                    Err(_) => return false,
                };
                mac.update(raw_body);
                base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
            }
            SignatureScheme::HeaderPresence { .. } => secret.to_string(),
        };

        constant_time_eq(expected.as_bytes(), provided.as_bytes())
    }
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }

    expected
        .iter()
        .zip(provided.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
