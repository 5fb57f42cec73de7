//! Transaction store
//!
//! The transaction row is the single piece of core mutable shared state.
//! All status changes go through [`TransactionStore::apply_transition`],
//! which serializes concurrent appliers per reference behind an exclusive
//! row lock inside one short-lived database transaction: at most one
//! effective `pending -> terminal` transition, every other applier becomes
//! a guaranteed no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::payments::types::PaymentState;

/// Persisted transaction row. `reference` is globally unique and immutable;
/// it is the sole idempotency key for reconciliation.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub reference: String,
    /// The driver that actually serviced the charge; may differ from the
    /// configured default when fallback occurred.
    pub provider: String,
    pub status: PaymentState,
    /// Amount in the major currency unit
    pub amount: Decimal,
    pub currency: String,
    pub email: String,
    /// Canonical or provider-native channel, set once a webhook or verify
    /// reveals it
    pub channel: Option<String>,
    pub metadata: serde_json::Value,
    pub customer: serde_json::Value,
    /// Set exactly once, on the first transition to success
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a transaction created by a successful charge.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference: String,
    pub provider: String,
    pub amount: Decimal,
    pub currency: String,
    pub email: String,
    pub metadata: serde_json::Value,
    pub customer: serde_json::Value,
}

/// A reconciled state change to apply to a transaction.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub status: PaymentState,
    /// Normalized channel, recorded when present
    pub channel: Option<String>,
    /// Provider-verified amount; the provider's response is authoritative,
    /// so a present value overwrites the stored amount
    pub amount: Option<Decimal>,
}

/// Outcome of an idempotent apply.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// The row transitioned from pending to a terminal state.
    Applied(Box<Transaction>),
    /// The row was already terminal; duplicate or late delivery, not an
    /// error.
    AlreadyTerminal(PaymentState),
    /// The incoming status was non-terminal; only the revealed channel was
    /// recorded.
    StillPending,
    /// No transaction exists for the reference.
    NotFound,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference
            && self.status == other.status
            && self.updated_at == other.updated_at
    }
}

/// Port over transaction persistence, injected into the payment manager and
/// the webhook reconciler.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn create(&self, new: NewTransaction) -> DbResult<Transaction>;

    async fn find_by_reference(&self, reference: &str) -> DbResult<Option<Transaction>>;

    /// Read-modify-write under an exclusive per-reference lock. Only a
    /// `pending` row accepts a terminal status; `paid_at` is set exactly
    /// once, on the first success transition.
    async fn apply_transition(
        &self,
        reference: &str,
        transition: StatusTransition,
    ) -> DbResult<ApplyOutcome>;

    async fn find_by_status(
        &self,
        status: PaymentState,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Transaction>>;

    async fn find_by_provider(
        &self,
        provider: &str,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Transaction>>;
}

const TRANSACTION_COLUMNS: &str = "reference, provider, status, amount, currency, email, \
     channel, metadata, customer, paid_at, created_at, updated_at";

/// Postgres-backed transaction store.
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn create(&self, new: NewTransaction) -> DbResult<Transaction> {
        sqlx::query_as::<_, Transaction>(&format!(
            "INSERT INTO transactions \
             (reference, provider, status, amount, currency, email, metadata, customer, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW()) \
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(&new.reference)
        .bind(&new.provider)
        .bind(PaymentState::Pending)
        .bind(new.amount)
        .bind(&new.currency)
        .bind(&new.email)
        .bind(&new.metadata)
        .bind(&new.customer)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_reference(&self, reference: &str) -> DbResult<Option<Transaction>> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn apply_transition(
        &self,
        reference: &str,
        transition: StatusTransition,
    ) -> DbResult<ApplyOutcome> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // Exclusive row lock: concurrent appliers for the same reference
        // queue here, bounded by the store's lock-wait timeout.
        let current = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE reference = $1 FOR UPDATE"
        ))
        .bind(reference)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(current) = current else {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(ApplyOutcome::NotFound);
        };

        if current.status.is_terminal() {
            // Duplicate or late delivery. Commit the no-op so the lock is
            // released promptly.
            tx.commit().await.map_err(DatabaseError::from_sqlx)?;
            debug!(
                reference = reference,
                status = %current.status,
                "transition skipped, transaction already terminal"
            );
            return Ok(ApplyOutcome::AlreadyTerminal(current.status));
        }

        if !transition.status.is_terminal() {
            // Nothing to transition; record the channel if the delivery
            // revealed one.
            if let Some(channel) = &transition.channel {
                sqlx::query(
                    "UPDATE transactions SET channel = COALESCE(channel, $2), updated_at = NOW() \
                     WHERE reference = $1",
                )
                .bind(reference)
                .bind(channel)
                .execute(&mut *tx)
                .await
                .map_err(DatabaseError::from_sqlx)?;
            }
            tx.commit().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(ApplyOutcome::StillPending);
        }

        let paid_at = if transition.status == PaymentState::Success {
            Some(Utc::now())
        } else {
            None
        };

        let updated = sqlx::query_as::<_, Transaction>(&format!(
            "UPDATE transactions \
             SET status = $2, \
                 channel = COALESCE($3, channel), \
                 amount = COALESCE($4, amount), \
                 paid_at = COALESCE(paid_at, $5), \
                 updated_at = NOW() \
             WHERE reference = $1 \
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(reference)
        .bind(transition.status)
        .bind(&transition.channel)
        .bind(transition.amount)
        .bind(paid_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;

        debug!(
            reference = reference,
            status = %updated.status,
            "transaction transitioned"
        );
        Ok(ApplyOutcome::Applied(Box::new(updated)))
    }

    async fn find_by_status(
        &self,
        status: PaymentState,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Transaction>> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE status = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_provider(
        &self,
        provider: &str,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Transaction>> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE provider = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(provider)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

/// In-memory transaction store. Backs tests and single-process setups; the
/// store-wide mutex serializes appliers, which subsumes the per-reference
/// locking the Postgres store provides.
#[derive(Default)]
pub struct MemoryTransactionStore {
    rows: Mutex<HashMap<String, Transaction>>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn create(&self, new: NewTransaction) -> DbResult<Transaction> {
        let mut rows = self.rows.lock().await;
        if rows.contains_key(&new.reference) {
            return Err(DatabaseError::new(
                DatabaseErrorKind::UniqueConstraintViolation {
                    column: "reference".to_string(),
                    value: new.reference,
                },
            ));
        }

        let now = Utc::now();
        let transaction = Transaction {
            reference: new.reference.clone(),
            provider: new.provider,
            status: PaymentState::Pending,
            amount: new.amount,
            currency: new.currency,
            email: new.email,
            channel: None,
            metadata: new.metadata,
            customer: new.customer,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        rows.insert(new.reference, transaction.clone());
        Ok(transaction)
    }

    async fn find_by_reference(&self, reference: &str) -> DbResult<Option<Transaction>> {
        Ok(self.rows.lock().await.get(reference).cloned())
    }

    async fn apply_transition(
        &self,
        reference: &str,
        transition: StatusTransition,
    ) -> DbResult<ApplyOutcome> {
        let mut rows = self.rows.lock().await;

        let Some(current) = rows.get_mut(reference) else {
            return Ok(ApplyOutcome::NotFound);
        };

        if current.status.is_terminal() {
            return Ok(ApplyOutcome::AlreadyTerminal(current.status));
        }

        if !transition.status.is_terminal() {
            if let Some(channel) = transition.channel {
                current.channel.get_or_insert(channel);
                current.updated_at = Utc::now();
            }
            return Ok(ApplyOutcome::StillPending);
        }

        current.status = transition.status;
        if let Some(channel) = transition.channel {
            current.channel.get_or_insert(channel);
        }
        if let Some(amount) = transition.amount {
            current.amount = amount;
        }
        if transition.status == PaymentState::Success && current.paid_at.is_none() {
            current.paid_at = Some(Utc::now());
        }
        current.updated_at = Utc::now();

        Ok(ApplyOutcome::Applied(Box::new(current.clone())))
    }

    async fn find_by_status(
        &self,
        status: PaymentState,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Transaction>> {
        let rows = self.rows.lock().await;
        let mut matching: Vec<Transaction> = rows
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn find_by_provider(
        &self,
        provider: &str,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<Transaction>> {
        let rows = self.rows.lock().await;
        let mut matching: Vec<Transaction> = rows
            .values()
            .filter(|t| t.provider == provider)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}
