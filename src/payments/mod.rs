//! Payment provider integration module
//!
//! Unified charge/verify surface over heterogeneous payment providers:
//! driver capability traits, provider registry, status/channel normalization
//! tables, webhook signature schemes and the fallback-aware payment manager.

pub mod error;
pub mod manager;
pub mod normalize;
pub mod registry;
pub mod signature;
pub mod traits;
pub mod types;

pub use error::{PaymentError, ProviderError};
pub use manager::PaymentManager;
pub use normalize::{ChannelMapper, StatusNormalizer};
pub use registry::ProviderRegistry;
pub use traits::{Driver, SupportsSubscriptions};
pub use types::{ChargeRequest, ChargeResult, PaymentState, VerificationResult};
