//! Follow-up scheduling

use crate::types::{
    EngineKind, EnginePayload, FollowUpSchedule, PrioritizedRecommendation, Severity, Timeframe,
};

/// Timeframe for an item no engine marked as immediate
pub fn timeframe_for(severity: Severity) -> Timeframe {
    match severity {
        Severity::Critical => Timeframe::Immediate,
        Severity::High | Severity::Moderate => Timeframe::ShortTerm,
        Severity::Low | Severity::Info => Timeframe::LongTerm,
    }
}

/// Bucket follow-up actions by timeframe
///
/// Findings marked immediate become a review item in the immediate bucket.
/// Each prioritized recommendation goes to the immediate bucket when any
/// engine marked it so, otherwise to the bucket its severity maps to.
/// Bucket order follows recommendation priority.
pub fn build_schedule(
    successes: &[(EngineKind, &EnginePayload)],
    recommendations: &[PrioritizedRecommendation],
) -> FollowUpSchedule {
    let mut schedule = FollowUpSchedule::default();

    let mut immediate_findings: Vec<(EngineKind, &EnginePayload)> = successes
        .iter()
        .filter(|(_, p)| p.immediate)
        .copied()
        .collect();
    immediate_findings.sort_by_key(|(kind, _)| *kind);
    for (kind, payload) in immediate_findings {
        schedule
            .immediate
            .push(format!("Review {} finding: {}", kind, payload.finding));
    }

    for rec in recommendations {
        let timeframe = if rec.immediate {
            Timeframe::Immediate
        } else {
            timeframe_for(rec.severity)
        };
        schedule.bucket_mut(timeframe).push(rec.text.clone());
    }

    schedule
}
