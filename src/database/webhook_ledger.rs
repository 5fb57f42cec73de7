//! Webhook delivery ledger
//!
//! Every delivery accepted by the gateway is recorded before it is queued,
//! giving the reconciler's attempt counter a durable home and leaving an
//! audit trail for deliveries that exhaust their retry budget.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DbResult};

/// One recorded webhook delivery.
#[derive(Debug, Clone, FromRow)]
pub struct WebhookDelivery {
    pub id: String,
    pub provider: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Port over webhook delivery bookkeeping.
#[async_trait]
pub trait WebhookLedger: Send + Sync {
    /// Record an accepted delivery. Returns the ledger id carried by the
    /// reconciliation job.
    async fn record_received(
        &self,
        provider: &str,
        payload: &serde_json::Value,
    ) -> DbResult<WebhookDelivery>;

    /// Mark a delivery fully reconciled (applied or a verified no-op).
    async fn mark_processed(&self, delivery_id: &str) -> DbResult<()>;

    /// Count a failed attempt and keep its error message.
    async fn record_failure(&self, delivery_id: &str, error: &str) -> DbResult<()>;

    async fn find_by_id(&self, delivery_id: &str) -> DbResult<Option<WebhookDelivery>>;
}

const DELIVERY_COLUMNS: &str =
    "id, provider, payload, processed, attempts, last_error, created_at, processed_at";

/// Postgres-backed delivery ledger.
pub struct PgWebhookLedger {
    pool: PgPool,
}

impl PgWebhookLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookLedger for PgWebhookLedger {
    async fn record_received(
        &self,
        provider: &str,
        payload: &serde_json::Value,
    ) -> DbResult<WebhookDelivery> {
        let delivery_id = Uuid::new_v4().to_string();

        sqlx::query_as::<_, WebhookDelivery>(&format!(
            "INSERT INTO webhook_deliveries (id, provider, payload, processed, attempts, created_at) \
             VALUES ($1, $2, $3, false, 0, NOW()) \
             RETURNING {DELIVERY_COLUMNS}"
        ))
        .bind(&delivery_id)
        .bind(provider)
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn mark_processed(&self, delivery_id: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE webhook_deliveries SET processed = true, processed_at = NOW() WHERE id = $1",
        )
        .bind(delivery_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn record_failure(&self, delivery_id: &str, error: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE webhook_deliveries SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(delivery_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn find_by_id(&self, delivery_id: &str) -> DbResult<Option<WebhookDelivery>> {
        sqlx::query_as::<_, WebhookDelivery>(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM webhook_deliveries WHERE id = $1"
        ))
        .bind(delivery_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

/// In-memory delivery ledger for tests.
#[derive(Default)]
pub struct MemoryWebhookLedger {
    deliveries: Mutex<HashMap<String, WebhookDelivery>>,
}

impl MemoryWebhookLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookLedger for MemoryWebhookLedger {
    async fn record_received(
        &self,
        provider: &str,
        payload: &serde_json::Value,
    ) -> DbResult<WebhookDelivery> {
        let delivery = WebhookDelivery {
            id: Uuid::new_v4().to_string(),
            provider: provider.to_string(),
            payload: payload.clone(),
            processed: false,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.deliveries
            .lock()
            .await
            .insert(delivery.id.clone(), delivery.clone());
        Ok(delivery)
    }

    async fn mark_processed(&self, delivery_id: &str) -> DbResult<()> {
        let mut deliveries = self.deliveries.lock().await;
        let delivery = deliveries
            .get_mut(delivery_id)
            .ok_or_else(|| DatabaseError::not_found("WebhookDelivery", delivery_id))?;
        delivery.processed = true;
        delivery.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn record_failure(&self, delivery_id: &str, error: &str) -> DbResult<()> {
        let mut deliveries = self.deliveries.lock().await;
        let delivery = deliveries
            .get_mut(delivery_id)
            .ok_or_else(|| DatabaseError::not_found("WebhookDelivery", delivery_id))?;
        delivery.attempts += 1;
        delivery.last_error = Some(error.to_string());
        Ok(())
    }

    async fn find_by_id(&self, delivery_id: &str) -> DbResult<Option<WebhookDelivery>> {
        Ok(self.deliveries.lock().await.get(delivery_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_marks_processed() {
        let ledger = MemoryWebhookLedger::new();
        let delivery = ledger
            .record_received("paystack", &serde_json::json!({"event": "charge.success"}))
            .await
            .unwrap();
        assert!(!delivery.processed);

        ledger.mark_processed(&delivery.id).await.unwrap();

        let stored = ledger.find_by_id(&delivery.id).await.unwrap().unwrap();
        assert!(stored.processed);
        assert!(stored.processed_at.is_some());
    }

    #[tokio::test]
    async fn failure_bumps_attempts_and_keeps_last_error() {
        let ledger = MemoryWebhookLedger::new();
        let delivery = ledger
            .record_received("stripe", &serde_json::json!({}))
            .await
            .unwrap();

        ledger
            .record_failure(&delivery.id, "store unavailable")
            .await
            .unwrap();
        ledger.record_failure(&delivery.id, "timeout").await.unwrap();

        let stored = ledger.find_by_id(&delivery.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 2);
        assert_eq!(stored.last_error.as_deref(), Some("timeout"));
        assert!(!stored.processed);
    }
}
