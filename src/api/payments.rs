//! Payment lookup, verification and provider health handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::{ApiError, AppState};
use crate::database::transaction_store::Transaction;
use crate::payments::types::{PaymentState, VerifiedPayment};

pub async fn get_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let transaction = state
        .store
        .find_by_reference(&reference)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("no transaction for reference {reference}")))?;

    Ok(Json(transaction))
}

#[derive(Deserialize)]
pub struct VerifyParams {
    /// Optional explicit provider, overriding session-cache routing
    pub provider: Option<String>,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<VerifiedPayment>, ApiError> {
    let verified = state
        .manager
        .verify(&reference, params.provider.as_deref())
        .await?;

    Ok(Json(verified))
}

pub async fn provider_health(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let healthy = state.manager.cached_health_check(&provider).await?;

    Ok(Json(serde_json::json!({
        "provider": provider,
        "healthy": healthy,
    })))
}

#[derive(Deserialize)]
pub struct ListParams {
    pub status: Option<PaymentState>,
    pub provider: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let offset = params.offset.unwrap_or(0).max(0);

    let transactions = match (&params.provider, params.status) {
        (Some(provider), _) => state.store.find_by_provider(provider, limit, offset).await?,
        (None, Some(status)) => state.store.find_by_status(status, limit, offset).await?,
        (None, None) => {
            return Err(ApiError::bad_request(
                "a status or provider query parameter is required",
            ))
        }
    };

    Ok(Json(transactions))
}
