//! Payrail backend library
//!
//! Provider resolution and webhook reconciliation engine: a unified
//! charge/verify surface over heterogeneous payment providers, plus the
//! asynchronous pipeline that folds duplicate-prone, out-of-order provider
//! webhooks into a single consistent transaction state.

pub mod api;
pub mod cache;
pub mod config;
pub mod database;
pub mod events;
pub mod payments;
pub mod webhooks;
