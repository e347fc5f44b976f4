//! Memory enrichment engine
//!
//! Places the current snapshot on the subject's health journey: every
//! numeric measurement is compared with its most recent prior value in the
//! session context. When the in-memory context is empty the journey is read
//! from the external context store.

use super::AnalysisEngine;
use crate::clients::ContextStore;
use crate::types::{
    EngineErrorKind, EngineKind, EnginePayload, EngineRecommendation, HealthSnapshot, RiskLevel,
    SessionContext, Severity,
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Relative change treated as "stable"
const STABLE_TOLERANCE: f64 = 0.02;

/// Relative change that warrants a recheck recommendation
const SIGNIFICANT_CHANGE: f64 = 0.20;

/// Direction of one measurement relative to its prior value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
    FirstMeasurement,
}

impl TrendDirection {
    fn label(&self) -> &'static str {
        match self {
            TrendDirection::Rising => "rising",
            TrendDirection::Falling => "falling",
            TrendDirection::Stable => "stable",
            TrendDirection::FirstMeasurement => "first measurement",
        }
    }
}

/// Trend of one measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementTrend {
    pub name: String,
    pub current: f64,
    pub previous: Option<f64>,
    pub direction: TrendDirection,
    /// Relative change versus `previous` (0.1 = +10%)
    pub relative_change: Option<f64>,
}

/// Compare current numeric measurements with the journey
pub fn compute_trends(snapshot: &HealthSnapshot, context: &SessionContext) -> Vec<MeasurementTrend> {
    snapshot
        .numeric_measurements()
        .into_iter()
        .map(|(name, current)| {
            let previous = context.last_value(&name);
            let relative_change = previous.map(|p| {
                if p == 0.0 {
                    if current == 0.0 {
                        0.0
                    } else {
                        current.signum()
                    }
                } else {
                    (current - p) / p.abs()
                }
            });
            let direction = match relative_change {
                None => TrendDirection::FirstMeasurement,
                Some(c) if c.abs() <= STABLE_TOLERANCE => TrendDirection::Stable,
                Some(c) if c > 0.0 => TrendDirection::Rising,
                Some(_) => TrendDirection::Falling,
            };
            MeasurementTrend {
                name,
                current,
                previous,
                direction,
                relative_change,
            }
        })
        .collect()
}

pub struct MemoryEnrichmentEngine {
    store: Arc<dyn ContextStore>,
}

impl MemoryEnrichmentEngine {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self { store }
    }

    /// In-memory context, or the stored journey when memory has none
    async fn journey(&self, context: &SessionContext) -> Result<SessionContext, EngineErrorKind> {
        if !context.summaries.is_empty() {
            return Ok(context.clone());
        }
        let stored = self
            .store
            .read(&context.subject_id, &context.session_id)
            .await?;
        debug!(
            subject_id = %context.subject_id,
            found = stored.is_some(),
            "Loaded journey from context store"
        );
        Ok(stored.unwrap_or_else(|| context.clone()))
    }
}

#[async_trait]
impl AnalysisEngine for MemoryEnrichmentEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::MemoryEnrichment
    }

    async fn analyze(
        &self,
        snapshot: &HealthSnapshot,
        context: &SessionContext,
    ) -> Result<EnginePayload, EngineErrorKind> {
        let journey = self.journey(context).await?;
        let trends = compute_trends(snapshot, &journey);
        Ok(journey_payload(&journey, &trends))
    }
}

/// Build the payload from the journey and its trends
///
/// Score is the mean of prior overall scores (neutral 50 with no history);
/// confidence grows with the number of prior summaries.
fn journey_payload(journey: &SessionContext, trends: &[MeasurementTrend]) -> EnginePayload {
    let history = journey.summaries.len();

    let score = if history == 0 {
        50.0
    } else {
        journey.summaries.iter().map(|s| s.overall_score).sum::<f64>() / history as f64
    };
    let confidence = (0.3 + 0.1 * history as f64).min(0.9);

    let significant: Vec<&MeasurementTrend> = trends
        .iter()
        .filter(|t| t.relative_change.is_some_and(|c| c.abs() >= SIGNIFICANT_CHANGE))
        .collect();

    let compared = trends
        .iter()
        .filter(|t| t.direction != TrendDirection::FirstMeasurement)
        .count();

    let finding = if history == 0 {
        "No prior measurements in this session; baseline established".to_string()
    } else if significant.is_empty() {
        format!(
            "{} of {} measurements compared with history; no significant changes",
            compared,
            trends.len()
        )
    } else {
        format!(
            "{} significant change(s) since the previous measurement: {}",
            significant.len(),
            significant
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };

    let (severity, risk) = if significant.is_empty() {
        (Severity::Info, RiskLevel::Low)
    } else {
        (Severity::Moderate, RiskLevel::Moderate)
    };

    let supporting_evidence = trends
        .iter()
        .map(|t| match (t.previous, t.relative_change) {
            (Some(prev), Some(change)) => format!(
                "{}: {} ({} -> {}, {:+.0}%)",
                t.name,
                t.direction.label(),
                prev,
                t.current,
                change * 100.0
            ),
            _ => format!("{}: {}", t.name, t.direction.label()),
        })
        .collect();

    let recommendations = significant
        .iter()
        .map(|t| {
            EngineRecommendation::new(
                format!(
                    "Recheck {}: it changed {:+.0}% since the previous measurement",
                    t.name,
                    t.relative_change.unwrap_or_default() * 100.0
                ),
                Severity::Moderate,
            )
        })
        .collect();

    EnginePayload {
        category: "health-journey".to_string(),
        finding,
        score,
        confidence,
        severity,
        risk,
        immediate: false,
        supporting_evidence,
        recommendations,
    }
}
