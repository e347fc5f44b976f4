//! External collaborator clients
//!
//! - **insight_provider** - AI insight provider (`call(prompt, context)`)
//! - **context_store** - external session/context store (`read`/`write`)
//!
//! Both are traits so the engines and orchestrator can be driven by
//! in-process implementations in tests.

pub mod context_store;
pub mod insight_provider;

pub use context_store::{ContextStore, ContextStoreError, HttpContextStore, InMemoryContextStore};
pub use insight_provider::{
    HttpInsightProvider, InsightProvider, ProviderAnswer, ProviderError, ProviderRequest,
};

use serde::Serialize;

/// Reachability of an external collaborator, reported on `/health`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    /// "healthy", "unhealthy" or "error"
    pub status: String,
    /// HTTP status code for unhealthy responses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
    /// Transport error for unreachable services
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            code: None,
            error: None,
        }
    }

    pub fn unhealthy(code: u16) -> Self {
        Self {
            status: "unhealthy".to_string(),
            code: Some(code),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            code: None,
            error: Some(message.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Probe `GET {base_url}/health`
pub(crate) async fn probe_health(client: &reqwest::Client, base_url: &str) -> ServiceHealth {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => ServiceHealth::healthy(),
        Ok(response) => ServiceHealth::unhealthy(response.status().as_u16()),
        Err(e) => ServiceHealth::error(e.to_string()),
    }
}
