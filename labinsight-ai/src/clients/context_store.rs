//! Session/Context Store client
//!
//! Long-term home of session contexts. The in-process cache holds the hot
//! copy; this store is read by the memory-enrichment engine when the cache
//! has nothing for a session, and written from a background task after
//! each analysis.
//!
//! # API Reference
//! - Read: `GET {context_store_url}/sessions/{subject}/{session}/context` (404 = none)
//! - Write: `PUT {context_store_url}/sessions/{subject}/{session}/context`

use super::{probe_health, ServiceHealth};
use crate::types::{EngineErrorKind, SessionContext};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Context store failure
#[derive(Debug, Error)]
pub enum ContextStoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Context store returned {status}: {body}")]
    Store { status: u16, body: String },

    #[error("Malformed context: {0}")]
    MalformedResponse(String),

    #[error("Invalid context store URL: {0}")]
    InvalidUrl(String),
}

impl From<ContextStoreError> for EngineErrorKind {
    fn from(err: ContextStoreError) -> Self {
        match err {
            ContextStoreError::Network(msg) => EngineErrorKind::Network(msg),
            ContextStoreError::Store { status, body } => {
                EngineErrorKind::Provider(format!("context store status {}: {}", status, body))
            }
            ContextStoreError::MalformedResponse(msg) => EngineErrorKind::MalformedResponse(msg),
            ContextStoreError::InvalidUrl(msg) => EngineErrorKind::Network(msg),
        }
    }
}

/// External session/context store
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Fetch the stored context for one session, if any
    async fn read(
        &self,
        subject_id: &str,
        session_id: &str,
    ) -> Result<Option<SessionContext>, ContextStoreError>;

    /// Replace the stored context for the context's session
    async fn write(&self, context: &SessionContext) -> Result<(), ContextStoreError>;

    async fn health(&self) -> ServiceHealth {
        ServiceHealth::healthy()
    }
}

/// HTTP context store (memory service)
pub struct HttpContextStore {
    http_client: Client,
    base_url: Url,
}

impl HttpContextStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ContextStoreError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ContextStoreError::Network(format!("Failed to create HTTP client: {}", e))
            })?;

        let base_url = base_url.into();
        let base_url = Url::parse(&base_url)
            .map_err(|e| ContextStoreError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ContextStoreError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// Ids become single path segments, percent-encoded
    fn context_url(&self, subject_id: &str, session_id: &str) -> Result<Url, ContextStoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ContextStoreError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["sessions", subject_id, session_id, "context"]);
        Ok(url)
    }
}

#[async_trait]
impl ContextStore for HttpContextStore {
    async fn read(
        &self,
        subject_id: &str,
        session_id: &str,
    ) -> Result<Option<SessionContext>, ContextStoreError> {
        let url = self.context_url(subject_id, session_id)?;
        debug!(url = %url, "Reading session context");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ContextStoreError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContextStoreError::Store {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<SessionContext>()
            .await
            .map(Some)
            .map_err(|e| ContextStoreError::MalformedResponse(e.to_string()))
    }

    async fn write(&self, context: &SessionContext) -> Result<(), ContextStoreError> {
        let url = self.context_url(&context.subject_id, &context.session_id)?;

        let response = self
            .http_client
            .put(url)
            .json(context)
            .send()
            .await
            .map_err(|e| ContextStoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContextStoreError::Store {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn health(&self) -> ServiceHealth {
        probe_health(&self.http_client, self.base_url.as_str()).await
    }
}

/// In-process context store
///
/// Used when running without a memory service, and by tests.
#[derive(Default)]
pub struct InMemoryContextStore {
    contexts: RwLock<HashMap<(String, String), SessionContext>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.contexts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.contexts.read().await.is_empty()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn read(
        &self,
        subject_id: &str,
        session_id: &str,
    ) -> Result<Option<SessionContext>, ContextStoreError> {
        let key = (subject_id.to_string(), session_id.to_string());
        Ok(self.contexts.read().await.get(&key).cloned())
    }

    async fn write(&self, context: &SessionContext) -> Result<(), ContextStoreError> {
        let key = (context.subject_id.clone(), context.session_id.clone());
        self.contexts.write().await.insert(key, context.clone());
        Ok(())
    }
}
