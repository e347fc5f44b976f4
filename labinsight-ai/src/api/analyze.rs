//! POST /analyze, DELETE /cache/{fingerprint}

use axum::{
    extract::{Path, State},
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::fingerprint::RequestFingerprint;
use crate::types::{HealthSnapshot, SynthesizedReport};
use crate::AppState;

/// POST /analyze request
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub snapshot: HealthSnapshot,
    /// Omitted or blank: a new session is started
    #[serde(default)]
    pub session_id: Option<String>,
}

/// POST /analyze response
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub session_id: String,
    pub fingerprint: RequestFingerprint,
    pub cached: bool,
    pub report: SynthesizedReport,
}

/// DELETE /cache/{fingerprint} response
#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub fingerprint: RequestFingerprint,
    pub invalidated: bool,
}

/// POST /analyze
///
/// Returns 400 for an invalid snapshot; every other problem degrades the
/// report instead of failing the request.
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Json<AnalyzeResponse>> {
    let session_id = request
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let outcome = state
        .orchestrator
        .analyze(request.snapshot, &session_id)
        .await
        .map_err(|e| {
            warn!("Rejected snapshot: {}", e);
            e
        })?;

    // Only a fresh fan-out says anything about current engine health
    if !outcome.cached {
        let last_error = outcome.report.degraded.then(|| {
            let missing: Vec<String> = outcome
                .report
                .per_engine
                .iter()
                .filter(|(_, s)| **s == crate::types::EngineStatus::Missing)
                .map(|(k, _)| k.to_string())
                .collect();
            format!("Degraded report; missing engines: {}", missing.join(", "))
        });
        *state.last_error.write().await = last_error;
    }

    Ok(Json(AnalyzeResponse {
        session_id,
        fingerprint: outcome.fingerprint,
        cached: outcome.cached,
        report: outcome.report.as_ref().clone(),
    }))
}

/// DELETE /cache/{fingerprint}
pub async fn invalidate(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> ApiResult<Json<InvalidateResponse>> {
    let fingerprint: RequestFingerprint = fingerprint.parse()?;
    let invalidated = state.orchestrator.invalidate(&fingerprint).await;

    Ok(Json(InvalidateResponse {
        fingerprint,
        invalidated,
    }))
}

pub fn analyze_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/cache/:fingerprint", delete(invalidate))
}
