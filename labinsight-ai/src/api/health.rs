//! Health check endpoint
//!
//! Reports uptime, cache statistics, and reachability of the insight
//! provider and context store.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::cache::CacheStats;
use crate::clients::ServiceHealth;
use crate::AppState;

/// Collaborator reachability
#[derive(Debug, Serialize)]
pub struct DependencyHealth {
    pub insight_provider: ServiceHealth,
    pub context_store: ServiceHealth,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when a collaborator or the cache is unavailable
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub engines: Vec<String>,
    pub cache_available: bool,
    pub cache: CacheStats,
    pub dependencies: DependencyHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let (insight_provider, context_store) =
        tokio::join!(state.provider.health(), state.context_store.health());

    let cache = state.orchestrator.cache();
    let cache_available = cache.is_available().await;
    let stats = cache.stats().await;

    let status = if cache_available && insight_provider.is_healthy() && context_store.is_healthy()
    {
        "ok"
    } else {
        "degraded"
    };

    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: status.to_string(),
        module: "labinsight-ai".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        engines: state
            .orchestrator
            .registry()
            .kinds()
            .iter()
            .map(|k| k.to_string())
            .collect(),
        cache_available,
        cache: stats,
        dependencies: DependencyHealth {
            insight_provider,
            context_store,
        },
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
