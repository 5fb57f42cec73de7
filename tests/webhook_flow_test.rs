//! End-to-end webhook reconciliation flow over the HTTP surface.
//!
//! Drives the real router, gateway, queue, workers and reconciler with a
//! mock driver signed under the HMAC-SHA512 hex scheme and in-memory ports.
//! No database or Redis instance is required.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bb8_redis::RedisConnectionManager;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::HeaderMap;
use rust_decimal::Decimal;
use sha2::Sha512;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use payrail_backend::api::{self, AppState};
use payrail_backend::cache::MemoryCache;
use payrail_backend::config::{
    Config, DatabaseConfig, ProviderConfig, RedisConfig, ServerConfig, WebhookConfig,
};
use payrail_backend::database::transaction_store::{
    MemoryTransactionStore, NewTransaction, TransactionStore,
};
use payrail_backend::database::webhook_ledger::{MemoryWebhookLedger, WebhookLedger};
use payrail_backend::events::MemoryEventPublisher;
use payrail_backend::payments::error::ProviderError;
use payrail_backend::payments::signature::SignatureScheme;
use payrail_backend::payments::types::{
    ChargeRequest, ChargeResult, PaymentState, VerificationResult,
};
use payrail_backend::payments::{
    ChannelMapper, Driver, PaymentManager, ProviderRegistry, StatusNormalizer,
};
use payrail_backend::webhooks::{self, WebhookQueue, WebhookReconciler};

const SECRET: &str = "whsec_test_secret";
const SIGNATURE_HEADER: &str = "x-payrail-signature";

struct SignedDriver {
    scheme: SignatureScheme,
}

impl SignedDriver {
    fn new() -> Self {
        Self {
            scheme: SignatureScheme::hmac_sha512_hex(SIGNATURE_HEADER),
        }
    }
}

#[async_trait]
impl Driver for SignedDriver {
    fn name(&self) -> &str {
        "paystack"
    }

    async fn charge(&self, _request: &ChargeRequest) -> Result<ChargeResult, ProviderError> {
        Err(ProviderError::transient("not under test"))
    }

    async fn verify(&self, reference: &str) -> Result<VerificationResult, ProviderError> {
        Err(ProviderError::not_found(reference))
    }

    fn validate_webhook_signature(&self, headers: &HeaderMap, raw_body: &[u8]) -> bool {
        self.scheme.verify(Some(SECRET), headers, raw_body)
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

    fn extract_webhook_timestamp(&self, payload: &serde_json::Value) -> Option<DateTime<Utc>> {
        payload["data"]["sent_at"]
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            environment: "development".to_string(),
        },
        database: DatabaseConfig {
            url: "postgres://localhost/payrail_test".to_string(),
            max_connections: 5,
        },
        redis: RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
        },
        providers: ProviderConfig {
            default_provider: "paystack".to_string(),
            fallback_provider: None,
            session_ttl_secs: 3600,
            health_ttl_secs: 300,
        },
        webhooks: WebhookConfig {
            tolerance_secs: 300,
            worker_count: 2,
            queue_capacity: 16,
            max_attempts: 3,
            retry_backoff_ms: 5,
        },
    }
}

struct TestApp {
    router: Router,
    store: Arc<MemoryTransactionStore>,
    ledger: Arc<MemoryWebhookLedger>,
    publisher: Arc<MemoryEventPublisher>,
}

fn test_app() -> TestApp {
    let config = test_config();

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(SignedDriver::new()));
    let registry = Arc::new(registry);

    let store = Arc::new(MemoryTransactionStore::new());
    let ledger = Arc::new(MemoryWebhookLedger::new());
    let publisher = Arc::new(MemoryEventPublisher::new());
    let cache = Arc::new(MemoryCache::new());
    let normalizer = Arc::new(StatusNormalizer::with_defaults());
    let channels = Arc::new(ChannelMapper::with_defaults());

    let manager = Arc::new(PaymentManager::new(
        registry.clone(),
        store.clone(),
        cache.clone(),
        cache,
        normalizer.clone(),
        channels.clone(),
        config.providers.clone(),
    ));

    let (queue, receiver) = WebhookQueue::new(config.webhooks.queue_capacity);
    let reconciler = Arc::new(WebhookReconciler::new(
        registry.clone(),
        store.clone(),
        ledger.clone(),
        normalizer,
        channels,
        publisher.clone(),
        &config.webhooks,
    ));
    webhooks::spawn_workers(config.webhooks.worker_count, receiver, reconciler);

    // Lazy pools: never connected, only present so the health endpoint has
    // something to probe.
    let db_pool = PgPoolOptions::new()
        .connect_lazy(&config.database.url)
        .unwrap();
    let cache_pool = bb8::Pool::builder()
        .build_unchecked(RedisConnectionManager::new(config.redis.url.clone()).unwrap());

    let state = AppState {
        config,
        registry,
        manager,
        store: store.clone(),
        ledger: ledger.clone(),
        queue,
        db_pool,
        cache_pool,
    };

    TestApp {
        router: api::router(state),
        store,
        ledger,
        publisher,
    }
}

async fn seed_pending(store: &MemoryTransactionStore, reference: &str) {
    store
        .create(NewTransaction {
            reference: reference.to_string(),
            provider: "paystack".to_string(),
            amount: Decimal::new(25000, 2),
            currency: "NGN".to_string(),
            email: "customer@example.com".to_string(),
            metadata: serde_json::Value::Null,
            customer: serde_json::Value::Null,
        })
        .await
        .unwrap();
}

async fn post_webhook(
    router: &Router,
    provider: &str,
    body: Vec<u8>,
    signature: Option<String>,
) -> axum::response::Response {
    let mut request = Request::builder()
        .method("POST")
        .uri(format!("/payments/webhook/{provider}"))
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header(SIGNATURE_HEADER, signature);
    }

    router
        .clone()
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_processed(ledger: &MemoryWebhookLedger, delivery_id: &str) {
    for _ in 0..200 {
        if let Some(delivery) = ledger.find_by_id(delivery_id).await.unwrap() {
            if delivery.processed || delivery.attempts >= 3 {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("delivery {delivery_id} never settled");
}

fn success_body(reference: &str) -> Vec<u8> {
    serde_json::json!({
        "event": "charge.success",
        "data": {"reference": reference, "status": "success", "channel": "bank"}
    })
    .to_string()
    .into_bytes()
}

fn timestamped_body(reference: &str, sent_at: DateTime<Utc>) -> Vec<u8> {
    serde_json::json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "status": "success",
            "channel": "bank",
            "sent_at": sent_at.to_rfc3339(),
        }
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn signed_webhook_reconciles_to_success() {
    let app = test_app();
    seed_pending(&app.store, "ref_flow_1").await;

    let body = success_body("ref_flow_1");
    let signature = sign(&body);
    let response = post_webhook(&app.router, "paystack", body, Some(signature)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let delivery_id = response_json(response).await["delivery_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_processed(&app.ledger, &delivery_id).await;

    let row = app
        .store
        .find_by_reference("ref_flow_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, PaymentState::Success);
    assert!(row.paid_at.is_some());
    // Provider-native "bank" token mapped to the canonical channel.
    assert_eq!(row.channel.as_deref(), Some("bank_transfer"));

    assert_eq!(app.publisher.published().await.len(), 2);
}

#[tokio::test]
async fn duplicate_delivery_is_accepted_but_changes_nothing() {
    let app = test_app();
    seed_pending(&app.store, "ref_flow_2").await;

    let body = success_body("ref_flow_2");
    let signature = sign(&body);

    let first = post_webhook(&app.router, "paystack", body.clone(), Some(signature.clone())).await;
    let first_id = response_json(first).await["delivery_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_processed(&app.ledger, &first_id).await;

    let settled = app
        .store
        .find_by_reference("ref_flow_2")
        .await
        .unwrap()
        .unwrap();

    let second = post_webhook(&app.router, "paystack", body, Some(signature)).await;
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    let second_id = response_json(second).await["delivery_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_processed(&app.ledger, &second_id).await;

    let row = app
        .store
        .find_by_reference("ref_flow_2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, PaymentState::Success);
    assert_eq!(row.paid_at, settled.paid_at, "paid_at is set exactly once");

    // Duplicate settles without publishing a second pair of events.
    assert_eq!(app.publisher.published().await.len(), 2);
}

#[tokio::test]
async fn late_failure_never_regresses_a_success() {
    let app = test_app();
    seed_pending(&app.store, "ref_flow_3").await;

    let body = success_body("ref_flow_3");
    let signature = sign(&body);
    let response = post_webhook(&app.router, "paystack", body, Some(signature)).await;
    let delivery_id = response_json(response).await["delivery_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_processed(&app.ledger, &delivery_id).await;

    let late_body = serde_json::json!({
        "event": "charge.failed",
        "data": {"reference": "ref_flow_3", "status": "abandoned"}
    })
    .to_string()
    .into_bytes();
    let late_signature = sign(&late_body);
    let late = post_webhook(&app.router, "paystack", late_body, Some(late_signature)).await;
    assert_eq!(late.status(), StatusCode::ACCEPTED);
    let late_id = response_json(late).await["delivery_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_processed(&app.ledger, &late_id).await;

    let row = app
        .store
        .find_by_reference("ref_flow_3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, PaymentState::Success);
}

#[tokio::test]
async fn forged_signature_is_rejected_before_any_processing() {
    let app = test_app();
    seed_pending(&app.store, "ref_flow_4").await;

    let body = success_body("ref_flow_4");
    let response = post_webhook(
        &app.router,
        "paystack",
        body,
        Some("deadbeef".repeat(16)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let row = app
        .store
        .find_by_reference("ref_flow_4")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, PaymentState::Pending);
    assert!(app.publisher.published().await.is_empty());
}

#[tokio::test]
async fn missing_signature_header_fails_closed() {
    let app = test_app();
    let body = success_body("ref_flow_5");
    let response = post_webhook(&app.router, "paystack", body, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_provider_is_indistinguishable_from_bad_signature() {
    let app = test_app();
    let body = success_body("ref_flow_6");
    let signature = sign(&body);
    let response = post_webhook(&app.router, "ghostpay", body, Some(signature)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(response).await["error"], "invalid signature");
}

#[tokio::test]
async fn malformed_payload_with_valid_signature_is_bad_request() {
    let app = test_app();
    let body = b"not json at all".to_vec();
    let signature = sign(&body);
    let response = post_webhook(&app.router, "paystack", body, Some(signature)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_before_charge_row_exhausts_retries() {
    let app = test_app();

    let body = success_body("ref_never_created");
    let signature = sign(&body);
    let response = post_webhook(&app.router, "paystack", body, Some(signature)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let delivery_id = response_json(response).await["delivery_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_processed(&app.ledger, &delivery_id).await;

    let delivery = app
        .ledger
        .find_by_id(&delivery_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!delivery.processed);
    assert_eq!(delivery.attempts, 3);
    assert!(delivery.last_error.is_some());
}

#[tokio::test]
async fn stale_embedded_timestamp_is_rejected_despite_valid_signature() {
    let app = test_app();
    seed_pending(&app.store, "ref_flow_7").await;

    // Signed correctly, but sent well outside the 300s tolerance window.
    let body = timestamped_body("ref_flow_7", Utc::now() - chrono::Duration::seconds(600));
    let signature = sign(&body);
    let response = post_webhook(&app.router, "paystack", body, Some(signature)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(response).await["error"], "stale webhook");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let row = app
        .store
        .find_by_reference("ref_flow_7")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, PaymentState::Pending);
    assert!(app.publisher.published().await.is_empty());
}

#[tokio::test]
async fn fresh_embedded_timestamp_is_accepted_and_reconciled() {
    let app = test_app();
    seed_pending(&app.store, "ref_flow_8").await;

    let body = timestamped_body("ref_flow_8", Utc::now());
    let signature = sign(&body);
    let response = post_webhook(&app.router, "paystack", body, Some(signature)).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let delivery_id = response_json(response).await["delivery_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_processed(&app.ledger, &delivery_id).await;

    let row = app
        .store
        .find_by_reference("ref_flow_8")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, PaymentState::Success);
    assert!(row.paid_at.is_some());
}
