//! Typed cache key builders
//!
//! Keys are namespaced and versioned so a layout change never collides with
//! entries written by an older deployment.

use std::fmt;

const NAMESPACE: &str = "payrail";
const VERSION: &str = "v1";

/// `payrail:v1:session:{reference}` -> [`SessionCacheEntry`]
///
/// [`SessionCacheEntry`]: crate::payments::types::SessionCacheEntry
pub struct SessionKey<'a> {
    reference: &'a str,
}

impl<'a> SessionKey<'a> {
    pub fn new(reference: &'a str) -> Self {
        Self { reference }
    }
}

impl fmt::Display for SessionKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{NAMESPACE}:{VERSION}:session:{}", self.reference)
    }
}

/// `payrail:v1:health:{provider}` -> bool
pub struct HealthKey<'a> {
    provider: &'a str,
}

impl<'a> HealthKey<'a> {
    pub fn new(provider: &'a str) -> Self {
        Self { provider }
    }
}

impl fmt::Display for HealthKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{NAMESPACE}:{VERSION}:health:{}", self.provider)
    }
}
