//! Overall score, confidence, and per-engine status

use crate::types::{clamp_or_zero, EngineKind, EnginePayload, EngineResult, EngineStatus};
use std::collections::BTreeMap;

/// A successful engine whose confidence falls below this is `Degraded`
pub const DEGRADED_CONFIDENCE: f64 = 0.25;

/// Weighted mean of successful engine scores
///
/// Weights are renormalized over the engines that succeeded, so the result
/// stays within 0-100 whichever subset is present. No successes yields 0.
pub fn overall_score(successes: &[(EngineKind, &EnginePayload)]) -> f64 {
    let total_weight: f64 = successes.iter().map(|(kind, _)| kind.weight()).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }

    let weighted: f64 = successes
        .iter()
        .map(|(kind, payload)| kind.weight() * payload.score)
        .sum();
    clamp_or_zero(weighted / total_weight, 0.0, 100.0)
}

/// Mean successful confidence scaled by the fraction of engines that succeeded
///
/// `mean(successful confidences) × (successes / registered)`. Losing an
/// engine that would have reported positive confidence strictly lowers the
/// result.
pub fn report_confidence(successes: &[(EngineKind, &EnginePayload)], registered: usize) -> f64 {
    if successes.is_empty() || registered == 0 {
        return 0.0;
    }
    let n = successes.len() as f64;
    let mean = successes.iter().map(|(_, p)| p.confidence).sum::<f64>() / n;
    clamp_or_zero(mean * (n / registered as f64), 0.0, 1.0)
}

/// Status of every registered engine
///
/// Engines with no result at all are reported `Missing`.
pub fn engine_statuses(
    registered: &[EngineKind],
    results: &[EngineResult],
) -> BTreeMap<EngineKind, EngineStatus> {
    registered
        .iter()
        .map(|kind| {
            let status = match results.iter().find(|r| r.kind() == *kind) {
                Some(EngineResult::Success { payload, .. })
                    if payload.confidence < DEGRADED_CONFIDENCE =>
                {
                    EngineStatus::Degraded
                }
                Some(EngineResult::Success { .. }) => EngineStatus::Ok,
                _ => EngineStatus::Missing,
            };
            (*kind, status)
        })
        .collect()
}
