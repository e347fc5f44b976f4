//! Metabolic engine
//!
//! Reads lab panels and vitals through a thyroid / metabolic lens. Body
//! temperature and resting pulse are treated as first-line metabolic
//! markers and passed to the provider alongside the prompt.

use super::prompt::build_contextual_prompt;
use super::AnalysisEngine;
use crate::clients::{InsightProvider, ProviderRequest};
use crate::types::{EngineErrorKind, EngineKind, EnginePayload, HealthSnapshot, SessionContext};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

const FOCUS: &str = "Metabolic and thyroid function";

const INSTRUCTIONS: [&str; 4] = [
    "Assess metabolic rate and thyroid function from these measurements",
    "Note any values suggesting stress or low metabolic output",
    "Give a 0-100 metabolic health score and your confidence",
    "List specific, actionable recommendations",
];

/// Below this oral temperature (°C) metabolism is flagged as low
const LOW_TEMPERATURE_C: f64 = 36.5;

/// Below this resting pulse (bpm) metabolism is flagged as low
const LOW_PULSE_BPM: f64 = 70.0;

pub struct MetabolicEngine {
    provider: Arc<dyn InsightProvider>,
}

impl MetabolicEngine {
    pub fn new(provider: Arc<dyn InsightProvider>) -> Self {
        Self { provider }
    }
}

/// Evidence lines for temperature and pulse outside the metabolic targets
fn metabolic_markers(snapshot: &HealthSnapshot) -> Vec<String> {
    let measurements = snapshot.numeric_measurements();
    let mut markers = Vec::new();

    let temperature = ["temperature", "body_temperature", "temp"]
        .iter()
        .find_map(|k| measurements.get(*k));
    if let Some(t) = temperature.filter(|t| **t < LOW_TEMPERATURE_C) {
        markers.push(format!(
            "temperature {:.1} below {:.1}",
            t, LOW_TEMPERATURE_C
        ));
    }

    let pulse = ["pulse", "heart_rate", "resting_heart_rate", "hr"]
        .iter()
        .find_map(|k| measurements.get(*k));
    if let Some(p) = pulse.filter(|p| **p < LOW_PULSE_BPM) {
        markers.push(format!("resting pulse {:.0} below {:.0}", p, LOW_PULSE_BPM));
    }

    markers
}

#[async_trait]
impl AnalysisEngine for MetabolicEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Metabolic
    }

    async fn analyze(
        &self,
        snapshot: &HealthSnapshot,
        context: &SessionContext,
    ) -> Result<EnginePayload, EngineErrorKind> {
        if snapshot.lab_panels.is_none() && snapshot.vitals.is_none() {
            return Err(EngineErrorKind::InsufficientData(
                "no lab panels or vitals".to_string(),
            ));
        }

        let markers = metabolic_markers(snapshot);
        let request = ProviderRequest {
            prompt: build_contextual_prompt(FOCUS, snapshot, Some(context), &INSTRUCTIONS),
            context: json!({
                "engine": self.kind().as_str(),
                "subject_id": snapshot.subject_id,
                "measurements": snapshot.numeric_measurements(),
                "metabolic_markers": markers,
            }),
        };

        let answer = self.provider.call(&request).await?;
        let mut payload = answer.into_payload("metabolic")?;
        payload.supporting_evidence.extend(markers);
        Ok(payload)
    }
}
