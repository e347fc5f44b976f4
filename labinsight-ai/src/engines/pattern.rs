//! Pattern engine
//!
//! Looks for relationships across measurement groups and against the
//! session's recent scores.

use super::prompt::{build_contextual_prompt, PROMPT_HISTORY_LIMIT};
use super::AnalysisEngine;
use crate::clients::{InsightProvider, ProviderRequest};
use crate::types::{EngineErrorKind, EngineKind, EnginePayload, HealthSnapshot, SessionContext};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

const FOCUS: &str = "Patterns across measurements and over time";

const INSTRUCTIONS: [&str; 4] = [
    "Identify relationships between the measurement groups",
    "Compare with the previous health context where available",
    "Give a 0-100 score for overall pattern health and your confidence",
    "List recommendations that address the patterns found",
];

/// Numeric measurements needed to look for cross-measurement patterns
/// when there is no history to compare against
const MIN_MEASUREMENTS: usize = 2;

pub struct PatternEngine {
    provider: Arc<dyn InsightProvider>,
}

impl PatternEngine {
    pub fn new(provider: Arc<dyn InsightProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AnalysisEngine for PatternEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Pattern
    }

    async fn analyze(
        &self,
        snapshot: &HealthSnapshot,
        context: &SessionContext,
    ) -> Result<EnginePayload, EngineErrorKind> {
        let measurements = snapshot.numeric_measurements();
        if measurements.len() < MIN_MEASUREMENTS && context.summaries.is_empty() {
            return Err(EngineErrorKind::InsufficientData(format!(
                "{} numeric measurements and no history",
                measurements.len()
            )));
        }

        let recent_scores: Vec<f64> = context
            .recent(PROMPT_HISTORY_LIMIT)
            .iter()
            .map(|s| s.overall_score)
            .collect();

        let request = ProviderRequest {
            prompt: build_contextual_prompt(FOCUS, snapshot, Some(context), &INSTRUCTIONS),
            context: json!({
                "engine": self.kind().as_str(),
                "subject_id": snapshot.subject_id,
                "measurements": measurements,
                "recent_scores": recent_scores,
            }),
        };

        let answer = self.provider.call(&request).await?;
        answer.into_payload("pattern")
    }
}
