use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use payrail_backend::api::{self, AppState};
use payrail_backend::cache::{self, CacheConfig, RedisCache};
use payrail_backend::config::Config;
use payrail_backend::database::transaction_store::PgTransactionStore;
use payrail_backend::database::webhook_ledger::PgWebhookLedger;
use payrail_backend::database::{self, PoolConfig};
use payrail_backend::events::TracingEventPublisher;
use payrail_backend::payments::{
    ChannelMapper, PaymentManager, ProviderRegistry, StatusNormalizer,
};
use payrail_backend::webhooks::{self, WebhookQueue, WebhookReconciler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::from_env()?;

    info!("Starting Payrail Backend");
    info!("Environment: {}", config.server.environment);
    info!("Default provider: {}", config.providers.default_provider);
    if let Some(fallback) = &config.providers.fallback_provider {
        info!("Fallback provider: {}", fallback);
    }

    let db_pool = database::init_pool(
        &config.database.url,
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            ..Default::default()
        }),
    )
    .await
    .context("failed to initialize database pool")?;

    let cache_pool = cache::init_cache_pool(CacheConfig {
        redis_url: config.redis.url.clone(),
        ..Default::default()
    })
    .await
    .context("failed to initialize cache pool")?;

    // Drivers are registered by the embedding deployment; the engine itself
    // ships none.
    let registry = Arc::new(ProviderRegistry::new());
    if registry.configured_providers().is_empty() {
        warn!("no payment drivers registered; charge, verify and webhook requests will be rejected");
    }

    let store = Arc::new(PgTransactionStore::new(db_pool.clone()));
    let ledger = Arc::new(PgWebhookLedger::new(db_pool.clone()));
    let redis_cache = Arc::new(RedisCache::new(cache_pool.clone()));
    let normalizer = Arc::new(StatusNormalizer::with_defaults());
    let channels = Arc::new(ChannelMapper::with_defaults());
    let publisher = Arc::new(TracingEventPublisher::new());

    let manager = Arc::new(PaymentManager::new(
        registry.clone(),
        store.clone(),
        redis_cache.clone(),
        redis_cache,
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
        publisher,
        &config.webhooks,
    ));
    let _workers = webhooks::spawn_workers(config.webhooks.worker_count, receiver, reconciler);
    info!(
        "Webhook reconciliation: {} workers, queue capacity {}",
        config.webhooks.worker_count, config.webhooks.queue_capacity
    );

    let state = AppState {
        config: config.clone(),
        registry,
        manager,
        store,
        ledger,
        queue,
        db_pool,
        cache_pool,
    };
    let app = api::router(state);

    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
            .await
            .context("failed to bind server address")?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
