//! Webhook gateway
//!
//! Trust boundary for provider callbacks. Signature validation happens here,
//! against the raw request bytes, before any JSON parsing. Everything the
//! gateway cannot positively authenticate is rejected with `401`, including
//! webhooks for providers that are not configured: a probe must not be able
//! to distinguish "unknown provider" from "bad signature". Accepted
//! deliveries are recorded and queued; the response never waits on
//! reconciliation.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use tracing::{info, warn};

use crate::api::AppState;
use crate::payments::Driver;
use crate::webhooks::WebhookJob;

pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(driver) = state.registry.resolve(&provider) else {
        warn!(provider = provider.as_str(), "webhook for unknown provider");
        return reject(StatusCode::UNAUTHORIZED, "invalid signature");
    };

    if !driver.validate_webhook_signature(&headers, &body) {
        warn!(
            provider = provider.as_str(),
            "webhook signature validation failed"
        );
        return reject(StatusCode::UNAUTHORIZED, "invalid signature");
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(provider = provider.as_str(), error = %e, "malformed webhook payload");
            return reject(StatusCode::BAD_REQUEST, "malformed payload");
        }
    };

    // Replay window on the embedded timestamp, when the driver exposes one.
    // Payloads without a timestamp are accepted.
    if let Some(sent_at) = driver.extract_webhook_timestamp(&payload) {
        let tolerance = chrono::Duration::seconds(state.config.webhooks.tolerance_secs as i64);
        let age = Utc::now().signed_duration_since(sent_at);
        if age > tolerance || age < -tolerance {
            warn!(
                provider = provider.as_str(),
                sent_at = %sent_at,
                "webhook timestamp outside the replay window"
            );
            return reject(StatusCode::UNAUTHORIZED, "stale webhook");
        }
    }

    let delivery = match state.ledger.record_received(driver.name(), &payload).await {
        Ok(delivery) => delivery,
        Err(e) => {
            warn!(provider = provider.as_str(), error = %e, "failed to record webhook delivery");
            return reject(StatusCode::INTERNAL_SERVER_ERROR, "delivery not recorded");
        }
    };

    let job = WebhookJob {
        provider: driver.name().to_string(),
        payload,
        delivery_id: delivery.id.clone(),
    };

    if let Err(e) = state.queue.enqueue(job) {
        // The provider retries on non-2xx; better to shed now than accept a
        // delivery that cannot be reconciled.
        warn!(
            provider = provider.as_str(),
            delivery_id = delivery.id.as_str(),
            error = %e,
            "failed to enqueue webhook delivery"
        );
        return reject(StatusCode::INTERNAL_SERVER_ERROR, "queue unavailable");
    }

    info!(
        provider = provider.as_str(),
        delivery_id = delivery.id.as_str(),
        "webhook accepted"
    );
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted", "delivery_id": delivery.id })),
    )
        .into_response()
}

fn reject(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}
