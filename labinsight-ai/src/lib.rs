//! labinsight-ai library interface
//!
//! Health-insight orchestration: validates a health snapshot, fans it out
//! to independent analysis engines under deadlines, and synthesizes one
//! report, with a session memory cache in front.

pub mod api;
pub mod cache;
pub mod clients;
pub mod engines;
pub mod error;
pub mod fingerprint;
pub mod orchestrator;
pub mod synthesis;
pub mod types;

pub use crate::error::{ApiError, ApiResult};
pub use crate::orchestrator::{AnalysisOutcome, Orchestrator, OrchestratorConfig};

use axum::Router;
use chrono::{DateTime, Utc};
use clients::{ContextStore, InsightProvider};
use labinsight_common::events::EventBus;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Probed by `/health`
    pub provider: Arc<dyn InsightProvider>,
    /// Probed by `/health`
    pub context_store: Arc<dyn ContextStore>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last degradation or error, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        provider: Arc<dyn InsightProvider>,
        context_store: Arc<dyn ContextStore>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            orchestrator,
            provider,
            context_store,
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::analyze_routes())
        .merge(api::session_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
