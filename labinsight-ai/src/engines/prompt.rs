//! Contextual prompt building and free-text recommendation extraction

use crate::types::{HealthSnapshot, SessionContext};
use std::fmt::Write;

/// Prior summaries included in a prompt
pub const PROMPT_HISTORY_LIMIT: usize = 3;

/// Characters kept from each prior summary
pub const SUMMARY_PREVIEW_CHARS: usize = 200;

/// Maximum recommendations extracted from free text
pub const MAX_EXTRACTED_RECOMMENDATIONS: usize = 5;

const ADVICE_KEYWORDS: [&str; 7] = [
    "recommend", "suggest", "consider", "try", "increase", "decrease", "avoid",
];

/// Build the prompt sent to the insight provider
///
/// Layout: focus line, measurement groups, up to three prior summaries
/// (each trimmed), then the engine's instructions.
pub fn build_contextual_prompt(
    focus: &str,
    snapshot: &HealthSnapshot,
    context: Option<&SessionContext>,
    instructions: &[&str],
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Focus: {}", focus);
    if let Some(ts) = snapshot.timestamp {
        let _ = writeln!(prompt, "Measured at: {}", ts.to_rfc3339());
    }

    prompt.push_str("\nCurrent measurements:\n");
    let groups = snapshot.groups();
    if groups.is_empty() {
        prompt.push_str("- none provided\n");
    }
    for (group, measurements) in groups {
        let values: Vec<String> = measurements
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        let _ = writeln!(prompt, "- {}: {}", group, values.join(", "));
    }

    if let Some(ctx) = context.filter(|c| !c.summaries.is_empty()) {
        prompt.push_str("\nPrevious health context:\n");
        for summary in ctx.recent(PROMPT_HISTORY_LIMIT) {
            let line = format!(
                "{}: score {:.0}, risk {:?}; {}",
                summary.timestamp.format("%Y-%m-%d"),
                summary.overall_score,
                summary.risk,
                summary.top_recommendations.join("; ")
            );
            let _ = writeln!(prompt, "- {}", preview(&line, SUMMARY_PREVIEW_CHARS));
        }
    }

    if !instructions.is_empty() {
        prompt.push_str("\nPlease provide:\n");
        for (i, instruction) in instructions.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", i + 1, instruction);
        }
    }

    prompt
}

/// First `max_chars` characters, with an ellipsis when cut
fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Pull advice lines out of a free-text answer
///
/// A line qualifies when it is longer than 10 characters and mentions one of
/// the advice keywords. Bullet markers are stripped; at most five lines are
/// returned, in their original order.
pub fn extract_recommendations(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c == '-' || c == '*' || c == '•')
                .trim()
        })
        .filter(|line| line.chars().count() > 10)
        .filter(|line| {
            let lower = line.to_lowercase();
            ADVICE_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .take(MAX_EXTRACTED_RECOMMENDATIONS)
        .map(str::to_string)
        .collect()
}
