//! Report Synthesis
//!
//! Reduces the engine results of one request into a single
//! `SynthesizedReport`. Pure and deterministic: the same results (in any
//! order) always give the same report.
//!
//! # Stages
//! 1. **scoring** - weighted overall score, confidence, per-engine status
//! 2. **recommendations** - deduplicate and prioritize
//! 3. **risk** - critical override, then majority vote
//! 4. **schedule** - bucket follow-up actions by timeframe
//!
//! With no successful engine at all, a minimal report is produced instead
//! (zero score and confidence, generic guidance).

pub mod recommendations;
pub mod risk;
pub mod schedule;
pub mod scoring;

use crate::types::{
    EngineKind, EnginePayload, EngineResult, EngineStatus, PrioritizedRecommendation, Severity,
    SynthesizedReport,
};
use chrono::{DateTime, Utc};
use labinsight_common::time::duration_to_millis;
use std::time::Duration;

/// Everything the synthesizer needs for one request
pub struct SynthesisInput<'a> {
    pub subject_id: &'a str,
    pub timestamp: DateTime<Utc>,
    /// Every engine registered at fan-out time
    pub registered: &'a [EngineKind],
    pub results: &'a [EngineResult],
    pub elapsed: Duration,
}

/// Build the report for one request
pub fn synthesize(input: &SynthesisInput<'_>) -> SynthesizedReport {
    let mut successes: Vec<(EngineKind, &EnginePayload)> = input
        .results
        .iter()
        .filter(|r| input.registered.contains(&r.kind()))
        .filter_map(|r| r.payload().map(|p| (r.kind(), p)))
        .collect();
    successes.sort_by_key(|(kind, _)| *kind);
    successes.dedup_by_key(|(kind, _)| *kind);

    let per_engine = scoring::engine_statuses(input.registered, input.results);
    let degraded = per_engine.values().any(|s| *s == EngineStatus::Missing);

    let prioritized_recommendations = if successes.is_empty() {
        fallback_recommendations()
    } else {
        recommendations::prioritize(&successes)
    };

    SynthesizedReport {
        subject_id: input.subject_id.to_string(),
        timestamp: input.timestamp,
        overall_score: scoring::overall_score(&successes),
        confidence: scoring::report_confidence(&successes, input.registered.len()),
        per_engine,
        risk_assessment: risk::assess_risk(&successes),
        follow_up_schedule: schedule::build_schedule(&successes, &prioritized_recommendations),
        prioritized_recommendations,
        degraded,
        processing_time_ms: duration_to_millis(input.elapsed),
    }
}

/// Generic guidance used when no engine produced a result
fn fallback_recommendations() -> Vec<PrioritizedRecommendation> {
    [
        (
            "Repeat the analysis later; no analysis engine produced a result",
            Severity::Moderate,
        ),
        (
            "Share these measurements with your healthcare provider for review",
            Severity::Moderate,
        ),
        (
            "Keep regular sleep, meals, and daily activity while results are pending",
            Severity::Low,
        ),
    ]
    .into_iter()
    .map(|(text, severity)| PrioritizedRecommendation {
        text: text.to_string(),
        severity,
        supporting_engines: Vec::new(),
        immediate: false,
    })
    .collect()
}
