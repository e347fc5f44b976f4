//! Risk assessment

use crate::types::{EngineKind, EnginePayload, RiskAssessment, RiskLevel, Severity};
use std::collections::BTreeMap;

/// Derive the report risk from the successful engines
///
/// 1. Any critical finding (critical severity or critical engine label)
///    makes the report critical.
/// 2. Otherwise the most common engine label wins; ties go to the more
///    conservative label.
///
/// Contributing factors are the findings of the engines whose label matches
/// the chosen level, in engine order.
pub fn assess_risk(successes: &[(EngineKind, &EnginePayload)]) -> RiskAssessment {
    let mut ordered: Vec<(EngineKind, &EnginePayload)> = successes.to_vec();
    ordered.sort_by_key(|(kind, _)| *kind);

    let critical: Vec<String> = ordered
        .iter()
        .filter(|(_, p)| p.severity == Severity::Critical || p.risk == RiskLevel::Critical)
        .map(|(kind, p)| factor(*kind, p))
        .collect();
    if !critical.is_empty() {
        return RiskAssessment {
            level: RiskLevel::Critical,
            contributing_factors: critical,
        };
    }

    let mut votes: BTreeMap<RiskLevel, usize> = BTreeMap::new();
    for (_, payload) in &ordered {
        *votes.entry(payload.risk).or_insert(0) += 1;
    }

    // BTreeMap iterates low to high, so max_by_key keeps the last (highest)
    // level among equal counts
    let Some(level) = votes
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(level, _)| *level)
    else {
        return RiskAssessment {
            level: RiskLevel::Moderate,
            contributing_factors: vec![
                "No analysis engine produced a result".to_string(),
            ],
        };
    };

    RiskAssessment {
        level,
        contributing_factors: ordered
            .iter()
            .filter(|(_, p)| p.risk == level)
            .map(|(kind, p)| factor(*kind, p))
            .collect(),
    }
}

fn factor(kind: EngineKind, payload: &EnginePayload) -> String {
    format!("{}: {}", kind, payload.finding)
}
