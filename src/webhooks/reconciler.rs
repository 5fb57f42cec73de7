//! Webhook reconciler
//!
//! Drives an accepted delivery to a settled state: extract the reference
//! and status through the provider's driver, normalize, and fold the result
//! into the transaction row via the store's idempotent transition. Failures
//! classified as retryable get a bounded number of fixed-backoff retries;
//! everything else is recorded in the ledger and dropped.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::WebhookConfig;
use crate::database::error::DatabaseError;
use crate::database::transaction_store::{ApplyOutcome, StatusTransition, TransactionStore};
use crate::database::webhook_ledger::WebhookLedger;
use crate::events::{DomainEvent, EventPublisher};
use crate::payments::normalize::{ChannelMapper, StatusNormalizer};
use crate::payments::registry::ProviderRegistry;
use crate::payments::traits::Driver;
use crate::webhooks::WebhookJob;

#[derive(Debug, Error)]
enum ReconcileError {
    /// The job names a provider with no registered driver. The gateway
    /// rejects these upfront, so this only fires if configuration changed
    /// between accept and reconcile.
    #[error("no driver registered for provider {0}")]
    UnknownProvider(String),

    /// No transaction row exists for the reference yet. Retryable: the
    /// provider may deliver faster than the charge row commits.
    #[error("no transaction found for reference {0}")]
    TransactionMissing(String),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

impl ReconcileError {
    fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::TransactionMissing(_) => true,
            ReconcileError::Store(e) => e.is_retryable,
            _ => false,
        }
    }
}

/// How a single reconciliation attempt settled.
#[derive(Debug, PartialEq)]
enum ReconcileOutcome {
    /// The transaction transitioned; events were published.
    Applied,
    /// Duplicate or late delivery against an already terminal row.
    Duplicate,
    /// Non-terminal status; at most the channel was recorded.
    StillPending,
    /// The status token mapped to no canonical state. Logged and settled as
    /// a no-op so an unknown token is never coerced into a terminal state.
    UnmappedStatus,
    /// The payload carried no transaction reference. Settled as a no-op:
    /// an unidentified notification will never resolve, so it must not
    /// consume retries.
    Unidentified,
}

pub struct WebhookReconciler {
    registry: Arc<ProviderRegistry>,
    store: Arc<dyn TransactionStore>,
    ledger: Arc<dyn WebhookLedger>,
    normalizer: Arc<StatusNormalizer>,
    channels: Arc<ChannelMapper>,
    publisher: Arc<dyn EventPublisher>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl WebhookReconciler {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        store: Arc<dyn TransactionStore>,
        ledger: Arc<dyn WebhookLedger>,
        normalizer: Arc<StatusNormalizer>,
        channels: Arc<ChannelMapper>,
        publisher: Arc<dyn EventPublisher>,
        settings: &WebhookConfig,
    ) -> Self {
        Self {
            registry,
            store,
            ledger,
            normalizer,
            channels,
            publisher,
            max_attempts: settings.max_attempts,
            retry_backoff: settings.retry_backoff(),
        }
    }

    /// Process one delivery to completion: reconcile with bounded retries
    /// and keep the ledger's attempt counter current. Never panics and
    /// never propagates; a worker must survive any single bad delivery.
    pub async fn process(&self, job: WebhookJob) {
        for attempt in 1..=self.max_attempts {
            match self.reconcile(&job).await {
                Ok(outcome) => {
                    if let Err(e) = self.ledger.mark_processed(&job.delivery_id).await {
                        warn!(
                            delivery_id = job.delivery_id.as_str(),
                            error = %e,
                            "failed to mark delivery processed"
                        );
                    }
                    info!(
                        provider = job.provider.as_str(),
                        delivery_id = job.delivery_id.as_str(),
                        outcome = ?outcome,
                        attempt,
                        "webhook reconciled"
                    );
                    return;
                }
                Err(err) => {
                    if let Err(e) = self
                        .ledger
                        .record_failure(&job.delivery_id, &err.to_string())
                        .await
                    {
                        warn!(
                            delivery_id = job.delivery_id.as_str(),
                            error = %e,
                            "failed to record reconciliation failure"
                        );
                    }

                    if !err.is_retryable() {
                        warn!(
                            provider = job.provider.as_str(),
                            delivery_id = job.delivery_id.as_str(),
                            error = %err,
                            "webhook reconciliation failed permanently"
                        );
                        return;
                    }

                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }

        error!(
            provider = job.provider.as_str(),
            delivery_id = job.delivery_id.as_str(),
            attempts = self.max_attempts,
            "webhook reconciliation exhausted its attempt budget"
        );
    }

    async fn reconcile(&self, job: &WebhookJob) -> Result<ReconcileOutcome, ReconcileError> {
        let driver = self
            .registry
            .resolve(&job.provider)
            .map_err(|_| ReconcileError::UnknownProvider(job.provider.clone()))?;
        let provider = driver.name().to_string();

        let Some(reference) = driver.extract_webhook_reference(&job.payload) else {
            warn!(
                provider = provider.as_str(),
                delivery_id = job.delivery_id.as_str(),
                "webhook payload carries no transaction reference, settling as no-op"
            );
            return Ok(ReconcileOutcome::Unidentified);
        };

        let raw_status = driver.extract_webhook_status(&job.payload);
        let Some(status) = self.normalizer.lookup(&raw_status, &provider) else {
            warn!(
                provider = provider.as_str(),
                reference = reference.as_str(),
                raw_status = raw_status.as_str(),
                "unmapped webhook status token, settling as no-op"
            );
            return Ok(ReconcileOutcome::UnmappedStatus);
        };

        let channel = driver.extract_webhook_channel(&job.payload).map(|token| {
            self.channels
                .from_provider_token(&token, &provider)
                .unwrap_or(token)
        });

        let outcome = self
            .store
            .apply_transition(
                &reference,
                StatusTransition {
                    status,
                    channel,
                    amount: None,
                },
            )
            .await?;

        match outcome {
            ApplyOutcome::Applied(transaction) => {
                let canonical = transaction.status.as_str();
                self.publisher
                    .publish(DomainEvent::provider_webhook_applied(
                        &provider, &reference, canonical, &job.payload,
                    ))
                    .await;
                self.publisher
                    .publish(DomainEvent::webhook_received(
                        &provider, &reference, canonical, &job.payload,
                    ))
                    .await;
                Ok(ReconcileOutcome::Applied)
            }
            ApplyOutcome::AlreadyTerminal(current) => {
                info!(
                    provider = provider.as_str(),
                    reference = reference.as_str(),
                    current = %current,
                    "duplicate delivery against a terminal transaction"
                );
                Ok(ReconcileOutcome::Duplicate)
            }
            ApplyOutcome::StillPending => Ok(ReconcileOutcome::StillPending),
            ApplyOutcome::NotFound => Err(ReconcileError::TransactionMissing(reference)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use http::HeaderMap;
    use rust_decimal::Decimal;

    use crate::database::transaction_store::{MemoryTransactionStore, NewTransaction};
    use crate::database::webhook_ledger::MemoryWebhookLedger;
    use crate::events::MemoryEventPublisher;
    use crate::payments::error::ProviderError;
    use crate::payments::types::{ChargeRequest, ChargeResult, PaymentState, VerificationResult};

    struct PayloadDriver {
        name: String,
    }

    #[async_trait]
    impl Driver for PayloadDriver {
        fn name(&self) -> &str {
            &self.name
        }

        async fn charge(&self, _request: &ChargeRequest) -> Result<ChargeResult, ProviderError> {
            Err(ProviderError::transient("not under test"))
        }

        async fn verify(&self, reference: &str) -> Result<VerificationResult, ProviderError> {
            Err(ProviderError::not_found(reference))
        }

        fn validate_webhook_signature(&self, _headers: &HeaderMap, _raw_body: &[u8]) -> bool {
            true
        }

        fn extract_webhook_reference(&self, payload: &serde_json::Value) -> Option<String> {
            payload["data"]["reference"].as_str().map(|s| s.to_string())
        }

        fn extract_webhook_status(&self, payload: &serde_json::Value) -> String {
            payload["data"]["status"]
                .as_str()
                .unwrap_or_default()
                .to_string()
        }

        fn extract_webhook_channel(&self, payload: &serde_json::Value) -> Option<String> {
            payload["data"]["channel"].as_str().map(|s| s.to_string())
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    struct Harness {
        reconciler: WebhookReconciler,
        store: Arc<MemoryTransactionStore>,
        ledger: Arc<MemoryWebhookLedger>,
        publisher: Arc<MemoryEventPublisher>,
    }

    fn harness() -> Harness {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(PayloadDriver {
            name: "paystack".to_string(),
        }));

        let store = Arc::new(MemoryTransactionStore::new());
        let ledger = Arc::new(MemoryWebhookLedger::new());
        let publisher = Arc::new(MemoryEventPublisher::new());

        let settings = WebhookConfig {
            tolerance_secs: 300,
            worker_count: 1,
            queue_capacity: 16,
            max_attempts: 3,
            retry_backoff_ms: 1,
        };

        let reconciler = WebhookReconciler::new(
            Arc::new(registry),
            store.clone(),
            ledger.clone(),
            Arc::new(StatusNormalizer::with_defaults()),
            Arc::new(ChannelMapper::with_defaults()),
            publisher.clone(),
            &settings,
        );

        Harness {
            reconciler,
            store,
            ledger,
            publisher,
        }
    }

    async fn seed_pending(h: &Harness, reference: &str) {
        h.store
            .create(NewTransaction {
                reference: reference.to_string(),
                provider: "paystack".to_string(),
                amount: Decimal::new(10000, 2),
                currency: "NGN".to_string(),
                email: "customer@example.com".to_string(),
                metadata: serde_json::Value::Null,
                customer: serde_json::Value::Null,
            })
            .await
            .unwrap();
    }

    async fn recorded_job(h: &Harness, payload: serde_json::Value) -> WebhookJob {
        let delivery = h
            .ledger
            .record_received("paystack", &payload)
            .await
            .unwrap();
        WebhookJob {
            provider: "paystack".to_string(),
            payload,
            delivery_id: delivery.id,
        }
    }

    fn success_payload(reference: &str) -> serde_json::Value {
        serde_json::json!({
            "event": "charge.success",
            "data": {"reference": reference, "status": "success", "channel": "banktransfer"}
        })
    }

    #[tokio::test]
    async fn applies_transition_and_publishes_events() {
        let h = harness();
        seed_pending(&h, "ref_1").await;
        let job = recorded_job(&h, success_payload("ref_1")).await;
        let delivery_id = job.delivery_id.clone();

        h.reconciler.process(job).await;

        let row = h.store.find_by_reference("ref_1").await.unwrap().unwrap();
        assert_eq!(row.status, PaymentState::Success);
        assert!(row.paid_at.is_some());
        // Provider-native channel token mapped to the canonical vocabulary.
        assert_eq!(row.channel.as_deref(), Some("bank_transfer"));

        let delivery = h.ledger.find_by_id(&delivery_id).await.unwrap().unwrap();
        assert!(delivery.processed);

        let events = h.publisher.published().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            DomainEvent::ProviderWebhookApplied { reference, status, .. }
                if reference == "ref_1" && status == "success"
        ));
        assert!(matches!(
            &events[1],
            DomainEvent::WebhookReceived { reference, .. } if reference == "ref_1"
        ));
    }

    #[tokio::test]
    async fn duplicate_delivery_is_processed_without_events() {
        let h = harness();
        seed_pending(&h, "ref_1").await;

        let first = recorded_job(&h, success_payload("ref_1")).await;
        h.reconciler.process(first).await;

        let second = recorded_job(&h, success_payload("ref_1")).await;
        let second_id = second.delivery_id.clone();
        h.reconciler.process(second).await;

        // Duplicate settles as processed, but no second event fires.
        let delivery = h.ledger.find_by_id(&second_id).await.unwrap().unwrap();
        assert!(delivery.processed);
        assert_eq!(h.publisher.published().await.len(), 2);
    }

    #[tokio::test]
    async fn unmapped_status_settles_as_no_op() {
        let h = harness();
        seed_pending(&h, "ref_1").await;
        let job = recorded_job(
            &h,
            serde_json::json!({
                "data": {"reference": "ref_1", "status": "SOMETHING_NEW"}
            }),
        )
        .await;
        let delivery_id = job.delivery_id.clone();

        h.reconciler.process(job).await;

        let row = h.store.find_by_reference("ref_1").await.unwrap().unwrap();
        assert_eq!(row.status, PaymentState::Pending);

        let delivery = h.ledger.find_by_id(&delivery_id).await.unwrap().unwrap();
        assert!(delivery.processed);
        assert!(h.publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn missing_reference_settles_as_no_op() {
        let h = harness();
        let job = recorded_job(&h, serde_json::json!({"data": {"status": "success"}})).await;
        let delivery_id = job.delivery_id.clone();

        h.reconciler.process(job).await;

        let delivery = h.ledger.find_by_id(&delivery_id).await.unwrap().unwrap();
        assert!(delivery.processed, "unidentified deliveries are not retried");
        assert_eq!(delivery.attempts, 0);
        assert!(h.publisher.published().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_transaction_exhausts_retry_budget() {
        let h = harness();
        let job = recorded_job(&h, success_payload("ref_never_charged")).await;
        let delivery_id = job.delivery_id.clone();

        h.reconciler.process(job).await;

        let delivery = h.ledger.find_by_id(&delivery_id).await.unwrap().unwrap();
        assert!(!delivery.processed);
        assert_eq!(delivery.attempts, 3);
    }

    #[tokio::test]
    async fn failed_status_applies_without_paid_at() {
        let h = harness();
        seed_pending(&h, "ref_1").await;
        let job = recorded_job(
            &h,
            serde_json::json!({
                "data": {"reference": "ref_1", "status": "abandoned"}
            }),
        )
        .await;

        h.reconciler.process(job).await;

        let row = h.store.find_by_reference("ref_1").await.unwrap().unwrap();
        assert_eq!(row.status, PaymentState::Failed);
        assert!(row.paid_at.is_none());
    }
}
