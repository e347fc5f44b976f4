//! AI Insight Provider client
//!
//! Sends a contextual prompt to the insight provider and receives a
//! structured answer. The provider may:
//! - reject the request (non-2xx status) → `ProviderError::Provider`
//! - answer with an unusable body → `ProviderError::MalformedResponse`
//! - not answer in time → `ProviderError::Timeout`
//!
//! Engines convert all of these into `EngineErrorKind` at their boundary.
//!
//! # API Reference
//! - Endpoint: `POST {insight_url}/query`
//! - Body: `{"query": <prompt>, "context": <json>, "include_sources": true, "max_results": 5}`

use super::{probe_health, ServiceHealth};
use crate::types::{
    clamp_or_zero, EngineErrorKind, EnginePayload, EngineRecommendation, RiskLevel, Severity,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Prompt plus structured context for one provider call
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest {
    pub prompt: String,
    /// Machine-readable context (engine kind, measurements, history)
    pub context: serde_json::Value,
}

/// Structured provider answer
///
/// Free-text `analysis` is always accepted; the structured fields are
/// optional so that a plain RAG answer can still be mapped by the engines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderAnswer {
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub finding: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub risk: Option<RiskLevel>,
    #[serde(default)]
    pub immediate: bool,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<EngineRecommendation>,
}

impl ProviderAnswer {
    /// Map the answer into the normalized engine payload
    ///
    /// Score and confidence are mandatory; everything else has a fallback:
    /// - finding: first non-empty line of `analysis`
    /// - severity: implied by `risk`, else `Info`
    /// - risk: implied by `severity`, else `Low`
    /// - recommendations: advice lines extracted from `analysis`
    pub fn into_payload(self, default_category: &str) -> Result<EnginePayload, EngineErrorKind> {
        let score = self
            .score
            .filter(|s| s.is_finite())
            .ok_or_else(|| EngineErrorKind::MalformedResponse("missing score".to_string()))?;
        let confidence = self
            .confidence
            .filter(|c| c.is_finite())
            .ok_or_else(|| EngineErrorKind::MalformedResponse("missing confidence".to_string()))?;

        let finding = self
            .finding
            .filter(|f| !f.trim().is_empty())
            .or_else(|| {
                self.analysis
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string)
            })
            .ok_or_else(|| EngineErrorKind::MalformedResponse("missing finding".to_string()))?;

        let (severity, risk) = match (self.severity, self.risk) {
            (Some(s), Some(r)) => (s, r),
            (Some(s), None) => (s, RiskLevel::from_severity(s)),
            (None, Some(r)) => (severity_for_risk(r), r),
            (None, None) => (Severity::Info, RiskLevel::Low),
        };

        let recommendations = if self.recommendations.is_empty() {
            crate::engines::prompt::extract_recommendations(&self.analysis)
                .into_iter()
                .map(|text| EngineRecommendation::new(text, severity))
                .collect()
        } else {
            self.recommendations
        };

        let mut supporting_evidence = self.evidence;
        supporting_evidence.extend(self.sources.iter().filter_map(source_label));

        Ok(EnginePayload {
            category: self
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| default_category.to_string()),
            finding,
            score: clamp_or_zero(score, 0.0, 100.0),
            confidence: clamp_or_zero(confidence, 0.0, 1.0),
            severity,
            risk,
            immediate: self.immediate,
            supporting_evidence,
            recommendations,
        })
    }
}

fn severity_for_risk(risk: RiskLevel) -> Severity {
    match risk {
        RiskLevel::Low => Severity::Low,
        RiskLevel::Moderate => Severity::Moderate,
        RiskLevel::High => Severity::High,
        RiskLevel::Critical => Severity::Critical,
    }
}

/// Human-readable label for a RAG source entry
fn source_label(source: &serde_json::Value) -> Option<String> {
    match source {
        serde_json::Value::String(s) => Some(format!("source: {}", s)),
        serde_json::Value::Object(map) => ["title", "name", "id"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
            .map(|s| format!("source: {}", s)),
        _ => None,
    }
}

/// Provider call failure
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Provider rejected the request
    #[error("Provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    /// Body could not be parsed
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Caller-supplied timeout exceeded
    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),
}

impl From<ProviderError> for EngineErrorKind {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Network(msg) => EngineErrorKind::Network(msg),
            ProviderError::Provider { status, body } => {
                EngineErrorKind::Provider(format!("status {}: {}", status, body))
            }
            ProviderError::MalformedResponse(msg) => EngineErrorKind::MalformedResponse(msg),
            ProviderError::Timeout(after) => {
                EngineErrorKind::Network(format!("provider timed out after {:?}", after))
            }
        }
    }
}

/// AI insight provider
#[async_trait]
pub trait InsightProvider: Send + Sync {
    /// Submit a prompt with context and receive a structured answer
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderAnswer, ProviderError>;

    /// Reachability probe for `/health`
    async fn health(&self) -> ServiceHealth {
        ServiceHealth::healthy()
    }
}

/// HTTP insight provider (RAG service)
pub struct HttpInsightProvider {
    http_client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    context: &'a serde_json::Value,
    include_sources: bool,
    max_results: u32,
}

impl HttpInsightProvider {
    /// Create a provider client with a transport timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl InsightProvider for HttpInsightProvider {
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderAnswer, ProviderError> {
        let url = format!("{}/query", self.base_url);
        debug!(url = %url, prompt_len = request.prompt.len(), "Querying insight provider");

        let body = QueryBody {
            query: &request.prompt,
            context: &request.context,
            include_sources: true,
            max_results: 5,
        };

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout)
                } else {
                    ProviderError::Network(format!("Insight provider request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(format!("Failed to read provider body: {}", e)))?;

        serde_json::from_str(&text).map_err(|e| {
            ProviderError::MalformedResponse(format!("Failed to parse provider response: {}", e))
        })
    }

    async fn health(&self) -> ServiceHealth {
        probe_health(&self.http_client, &self.base_url).await
    }
}
