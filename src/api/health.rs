use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::{cache, database};

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub database: String,
    pub cache: String,
    pub providers: Vec<String>,
}

/// Service health: database and cache connectivity plus the configured
/// provider names. Always answers 200; a degraded dependency is reported in
/// the body, not as a request failure.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_up = database::health_check(&state.db_pool).await.is_ok();
    let cache_up = cache::health_check(&state.cache_pool).await.is_ok();

    let status = if database_up && cache_up {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.config.server.environment.clone(),
        database: if database_up { "up" } else { "down" }.to_string(),
        cache: if cache_up { "up" } else { "down" }.to_string(),
        providers: state.registry.configured_providers(),
    })
}
