//! HTTP surface
//!
//! Thin axum handlers over the payment manager, the transaction store and
//! the webhook gateway. All domain decisions live below this layer; handlers
//! translate errors to status codes and nothing else.

pub mod health;
pub mod payments;
pub mod webhooks;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::cache::RedisPool;
use crate::config::Config;
use crate::database::transaction_store::TransactionStore;
use crate::database::webhook_ledger::WebhookLedger;
use crate::payments::error::{PaymentError, ProviderError};
use crate::payments::{PaymentManager, ProviderRegistry};
use crate::webhooks::WebhookQueue;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub registry: Arc<ProviderRegistry>,
    pub manager: Arc<PaymentManager>,
    pub store: Arc<dyn TransactionStore>,
    pub ledger: Arc<dyn WebhookLedger>,
    pub queue: WebhookQueue,
    pub db_pool: PgPool,
    pub cache_pool: RedisPool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/payments/webhook/:provider", post(webhooks::receive_webhook))
        .route("/payments/:reference", get(payments::get_payment))
        .route("/payments/:reference/verify", post(payments::verify_payment))
        .route(
            "/payments/providers/:provider/health",
            get(payments::provider_health),
        )
        .route("/transactions", get(payments::list_transactions))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// Handler-level error: a status code and a client-safe message.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        let status = match &err {
            PaymentError::DriverNotFound { .. } => StatusCode::NOT_FOUND,
            PaymentError::UnsupportedCapability { .. } => StatusCode::BAD_REQUEST,
            PaymentError::Provider { source, .. } => match source {
                ProviderError::NotFound { .. } => StatusCode::NOT_FOUND,
                ProviderError::Validation { .. } => StatusCode::BAD_REQUEST,
                ProviderError::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                ProviderError::Transient { .. } => StatusCode::BAD_GATEWAY,
            },
            PaymentError::AllProvidersFailed { .. } => StatusCode::BAD_GATEWAY,
            PaymentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        Self::new(status, err.to_string())
    }
}

impl From<crate::database::error::DatabaseError> for ApiError {
    fn from(err: crate::database::error::DatabaseError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}
