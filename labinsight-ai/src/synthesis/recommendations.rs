//! Recommendation deduplication and prioritization

use crate::types::{EngineKind, EnginePayload, PrioritizedRecommendation, Severity};
use std::collections::{BTreeMap, BTreeSet};

/// Dedup key: lowercase, single-spaced, trailing punctuation removed
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches(|c: char| c == '.' || c == '!' || c == ';' || c == ',')
        .to_string()
}

struct Merged {
    text: String,
    severity: Severity,
    engines: BTreeSet<EngineKind>,
    immediate: bool,
}

/// Merge every engine's recommendations into one ordered list
///
/// Recommendations with the same normalized text collapse into one entry
/// carrying the highest severity and every supporting engine. The displayed
/// text comes from the most severe proposal (lexicographically smallest on
/// ties), so the result does not depend on engine completion order.
///
/// Ordering: severity descending, then number of supporting engines
/// descending, then normalized text ascending.
pub fn prioritize(successes: &[(EngineKind, &EnginePayload)]) -> Vec<PrioritizedRecommendation> {
    let mut merged: BTreeMap<String, Merged> = BTreeMap::new();

    for (kind, payload) in successes {
        for rec in &payload.recommendations {
            let text = rec.text.trim();
            let key = normalize_text(text);
            if key.is_empty() {
                continue;
            }

            let entry = merged.entry(key).or_insert_with(|| Merged {
                text: text.to_string(),
                severity: rec.severity,
                engines: BTreeSet::new(),
                immediate: false,
            });

            if rec.severity > entry.severity
                || (rec.severity == entry.severity && text < entry.text.as_str())
            {
                entry.text = text.to_string();
            }
            entry.severity = entry.severity.max(rec.severity);
            entry.engines.insert(*kind);
            entry.immediate |= rec.immediate;
        }
    }

    let mut ordered: Vec<(String, Merged)> = merged.into_iter().collect();
    ordered.sort_by(|(key_a, a), (key_b, b)| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.engines.len().cmp(&a.engines.len()))
            .then_with(|| key_a.cmp(key_b))
    });

    ordered
        .into_iter()
        .map(|(_, m)| PrioritizedRecommendation {
            text: m.text,
            severity: m.severity,
            supporting_engines: m.engines.into_iter().collect(),
            immediate: m.immediate,
        })
        .collect()
}
