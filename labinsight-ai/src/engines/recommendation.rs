//! Recommendation engine
//!
//! Asks the provider for concrete lifestyle and nutrition guidance. An
//! answer without a single recommendation is treated as malformed.

use super::prompt::build_contextual_prompt;
use super::AnalysisEngine;
use crate::clients::{InsightProvider, ProviderRequest};
use crate::types::{EngineErrorKind, EngineKind, EnginePayload, HealthSnapshot, SessionContext};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

const FOCUS: &str = "Actionable nutrition and lifestyle guidance";

const INSTRUCTIONS: [&str; 4] = [
    "Recommend specific changes to diet, activity, sleep, and stress",
    "Mark anything that needs medical attention now as immediate",
    "Give a 0-100 score for current lifestyle support and your confidence",
    "Keep each recommendation to one sentence",
];

pub struct RecommendationEngine {
    provider: Arc<dyn InsightProvider>,
}

impl RecommendationEngine {
    pub fn new(provider: Arc<dyn InsightProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AnalysisEngine for RecommendationEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Recommendation
    }

    async fn analyze(
        &self,
        snapshot: &HealthSnapshot,
        context: &SessionContext,
    ) -> Result<EnginePayload, EngineErrorKind> {
        let prior: Vec<&String> = context
            .summaries
            .iter()
            .rev()
            .flat_map(|s| s.top_recommendations.iter())
            .take(5)
            .collect();

        let request = ProviderRequest {
            prompt: build_contextual_prompt(FOCUS, snapshot, Some(context), &INSTRUCTIONS),
            context: json!({
                "engine": self.kind().as_str(),
                "subject_id": snapshot.subject_id,
                "lifestyle": snapshot.lifestyle,
                "prior_recommendations": prior,
            }),
        };

        let answer = self.provider.call(&request).await?;
        let payload = answer.into_payload("recommendation")?;
        if payload.recommendations.is_empty() {
            return Err(EngineErrorKind::MalformedResponse(
                "answer contained no recommendations".to_string(),
            ));
        }
        Ok(payload)
    }
}
