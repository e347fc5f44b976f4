//! GET /sessions/{subject}/{session}/context

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::types::ReportSummary;
use crate::AppState;

const DEFAULT_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Most recent summaries of one session, oldest first
#[derive(Debug, Serialize)]
pub struct SessionContextResponse {
    pub subject_id: String,
    pub session_id: String,
    pub total: usize,
    pub summaries: Vec<ReportSummary>,
}

pub async fn get_session_context(
    State(state): State<AppState>,
    Path((subject_id, session_id)): Path<(String, String)>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<Json<SessionContextResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 {
        return Err(ApiError::BadRequest("limit must be at least 1".to_string()));
    }

    let context = state
        .orchestrator
        .session_context(&subject_id, &session_id)
        .await
        .ok_or_else(|| {
            ApiError::NotFound(format!("No context for session {}/{}", subject_id, session_id))
        })?;

    Ok(Json(SessionContextResponse {
        total: context.summaries.len(),
        summaries: context.recent(limit).to_vec(),
        subject_id: context.subject_id,
        session_id: context.session_id,
    }))
}

pub fn session_routes() -> Router<AppState> {
    Router::new().route(
        "/sessions/:subject_id/:session_id/context",
        get(get_session_context),
    )
}
