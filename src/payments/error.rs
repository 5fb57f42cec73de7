//! Typed error kinds for driver calls and the payment manager surface.
//!
//! Drivers return a tagged `ProviderError` rather than raising transport
//! exceptions, so the fallback decision in the manager is a plain match on
//! the error kind.

use thiserror::Error;

use crate::database::error::DatabaseError;

/// Failure kinds a driver call can produce.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// Network timeout, connection refusal or a provider 5xx. The only kind
    /// that advances the fallback chain or a reconciler retry.
    #[error("transient provider failure: {message}")]
    Transient { message: String },

    /// The provider rejected the request shape. Surfaced immediately.
    #[error("provider validation failure: {message}")]
    Validation { message: String },

    /// Explicit business rejection (4xx). Surfaced immediately; fallback must
    /// never mask a genuine rejection as if no provider had been tried.
    #[error("provider rejected the request: {message}")]
    Rejected { message: String },

    /// The provider has no record of the reference.
    #[error("reference not found at provider: {reference}")]
    NotFound { reference: String },
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn not_found(reference: impl Into<String>) -> Self {
        Self::NotFound {
            reference: reference.into(),
        }
    }

    /// Whether a retry or the next fallback candidate may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Errors surfaced by the payment manager and registry.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The named provider is not configured. A caller/config error, never
    /// subject to fallback.
    #[error("payment provider not configured: {provider}")]
    DriverNotFound { provider: String },

    /// The driver does not implement the requested optional capability.
    #[error("provider {provider} does not support {capability}")]
    UnsupportedCapability {
        provider: String,
        capability: &'static str,
    },

    /// A non-transient driver failure, surfaced as-is from the provider that
    /// produced it.
    #[error("{provider}: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    /// Every candidate in the chain failed transiently. Carries the message
    /// of the last attempted provider only.
    #[error("all providers exhausted, last attempt ({provider}) failed: {message}")]
    AllProvidersFailed { provider: String, message: String },

    #[error("transaction store error: {0}")]
    Store(#[from] DatabaseError),
}

impl PaymentError {
    pub fn driver_not_found(provider: impl Into<String>) -> Self {
        Self::DriverNotFound {
            provider: provider.into(),
        }
    }
}
