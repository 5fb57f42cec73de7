//! Domain events and the publisher port
//!
//! The reconciler announces applied webhook transitions through an injected
//! [`EventPublisher`]. Delivery to downstream consumers is best-effort;
//! only the persisted state transition itself is exactly-once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

/// Events emitted by the reconciliation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// Provider-scoped event for an applied webhook transition.
    ProviderWebhookApplied {
        provider: String,
        reference: String,
        status: String,
        payload: serde_json::Value,
        occurred_at: DateTime<Utc>,
    },
    /// Generic event dispatched for every applied webhook, regardless of
    /// provider.
    WebhookReceived {
        provider: String,
        reference: String,
        status: String,
        payload: serde_json::Value,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn provider_webhook_applied(
        provider: &str,
        reference: &str,
        status: &str,
        payload: &serde_json::Value,
    ) -> Self {
        Self::ProviderWebhookApplied {
            provider: provider.to_string(),
            reference: reference.to_string(),
            status: status.to_string(),
            payload: payload.clone(),
            occurred_at: Utc::now(),
        }
    }

    pub fn webhook_received(
        provider: &str,
        reference: &str,
        status: &str,
        payload: &serde_json::Value,
    ) -> Self {
        Self::WebhookReceived {
            provider: provider.to_string(),
            reference: reference.to_string(),
            status: status.to_string(),
            payload: payload.clone(),
            occurred_at: Utc::now(),
        }
    }
}

/// Publisher port injected into the reconciler.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent);
}

/// Publishes events as structured log lines.
#[derive(Default)]
pub struct TracingEventPublisher;

impl TracingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for TracingEventPublisher {
    async fn publish(&self, event: DomainEvent) {
        match &event {
            DomainEvent::ProviderWebhookApplied {
                provider,
                reference,
                status,
                ..
            } => {
                info!(
                    provider = provider.as_str(),
                    reference = reference.as_str(),
                    status = status.as_str(),
                    "provider webhook applied"
                );
            }
            DomainEvent::WebhookReceived {
                provider,
                reference,
                status,
                ..
            } => {
                info!(
                    provider = provider.as_str(),
                    reference = reference.as_str(),
                    status = status.as_str(),
                    "webhook received"
                );
            }
        }
    }
}

/// Collects published events in memory, for tests.
#[derive(Default)]
pub struct MemoryEventPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventPublisher {
    async fn publish(&self, event: DomainEvent) {
        self.events.lock().await.push(event);
    }
}
