//! Core Types for LabInsight AI
//!
//! Defines the value objects that flow through the analysis pipeline:
//! - **Input:** HealthSnapshot (validated, immutable)
//! - **Engine layer:** EngineKind, EnginePayload, EngineResult
//! - **Output:** SynthesizedReport and its parts
//! - **Enrichment:** SessionContext / ReportSummary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Input: Health Snapshot
// ============================================================================

/// One measurement value inside a group
///
/// Untagged so the JSON envelope reads naturally:
/// `{"glucose": 92.0, "notes": "fasted", "smoker": false}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl MeasurementValue {
    /// Numeric value, if this measurement is numeric
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MeasurementValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for MeasurementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementValue::Flag(b) => write!(f, "{}", b),
            MeasurementValue::Number(n) => write!(f, "{}", n),
            MeasurementValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Named measurements within a group (BTreeMap keeps iteration sorted)
pub type MeasurementGroup = BTreeMap<String, MeasurementValue>;

/// Structured snapshot of a subject's health measurements
///
/// Subject identifier and timestamp are always present once validated;
/// every measurement group is optional. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Subject (user) identifier
    #[serde(default)]
    pub subject_id: String,
    /// When the measurements were taken
    pub timestamp: Option<DateTime<Utc>>,
    /// Vital signs (heart rate, blood pressure, temperature, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<MeasurementGroup>,
    /// Lab panel values (glucose, TSH, cholesterol, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_panels: Option<MeasurementGroup>,
    /// Subjective ratings (energy, sleep quality, mood, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subjective: Option<MeasurementGroup>,
    /// Lifestyle facts (diet, exercise, smoking, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifestyle: Option<MeasurementGroup>,
    /// Additional open-ended groups keyed by group name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, MeasurementGroup>,
}

impl HealthSnapshot {
    /// Create a snapshot with no measurement groups
    pub fn new(subject_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            subject_id: subject_id.into(),
            timestamp: Some(timestamp),
            vitals: None,
            lab_panels: None,
            subjective: None,
            lifestyle: None,
            extra: BTreeMap::new(),
        }
    }

    /// All present groups as (group name, measurements), in fixed order
    pub fn groups(&self) -> Vec<(&str, &MeasurementGroup)> {
        let mut groups = Vec::new();
        if let Some(g) = &self.vitals {
            groups.push(("vitals", g));
        }
        if let Some(g) = &self.lab_panels {
            groups.push(("lab_panels", g));
        }
        if let Some(g) = &self.subjective {
            groups.push(("subjective", g));
        }
        if let Some(g) = &self.lifestyle {
            groups.push(("lifestyle", g));
        }
        for (name, g) in &self.extra {
            groups.push((name.as_str(), g));
        }
        groups
    }

    /// Numeric measurements across all groups, keyed by measurement name
    pub fn numeric_measurements(&self) -> BTreeMap<String, f64> {
        self.groups()
            .into_iter()
            .flat_map(|(_, group)| group.iter())
            .filter_map(|(name, value)| value.as_f64().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Check the snapshot invariants
    ///
    /// # Errors
    /// `AnalysisError::InputValidation` if the subject identifier is blank
    /// or the timestamp is missing.
    pub fn validate(&self) -> Result<DateTime<Utc>, AnalysisError> {
        if self.subject_id.trim().is_empty() {
            return Err(AnalysisError::InputValidation(
                "subject_id must be non-empty".to_string(),
            ));
        }
        self.timestamp.ok_or_else(|| {
            AnalysisError::InputValidation("timestamp is required".to_string())
        })
    }
}

// ============================================================================
// Engine Layer
// ============================================================================

/// Analysis engine kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    Metabolic,
    Pattern,
    Recommendation,
    MemoryEnrichment,
}

impl EngineKind {
    /// All engine kinds, in registry order
    pub const ALL: [EngineKind; 4] = [
        EngineKind::Metabolic,
        EngineKind::Pattern,
        EngineKind::Recommendation,
        EngineKind::MemoryEnrichment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Metabolic => "metabolic",
            EngineKind::Pattern => "pattern",
            EngineKind::Recommendation => "recommendation",
            EngineKind::MemoryEnrichment => "memory-enrichment",
        }
    }

    /// Fixed synthesis weight for this engine kind
    ///
    /// Weights sum to 1.0 across all kinds; the synthesizer renormalizes
    /// over whichever subset succeeded.
    pub fn weight(&self) -> f64 {
        match self {
            EngineKind::Metabolic => 0.35,
            EngineKind::Pattern => 0.25,
            EngineKind::Recommendation => 0.25,
            EngineKind::MemoryEnrichment => 0.15,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finding / recommendation severity, ordered least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Moderate,
    High,
    Critical,
}

/// Risk label, ordered least to most conservative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    /// Risk label implied by a single finding severity
    pub fn from_severity(severity: Severity) -> Self {
        match severity {
            Severity::Info | Severity::Low => RiskLevel::Low,
            Severity::Moderate => RiskLevel::Moderate,
            Severity::High => RiskLevel::High,
            Severity::Critical => RiskLevel::Critical,
        }
    }
}

/// Follow-up timeframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Timeframe {
    Immediate,
    ShortTerm,
    LongTerm,
}

/// One engine's recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRecommendation {
    pub text: String,
    pub severity: Severity,
    /// Engine asked for this to be acted on immediately
    #[serde(default)]
    pub immediate: bool,
}

impl EngineRecommendation {
    pub fn new(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity,
            immediate: false,
        }
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }
}

/// Normalized payload every engine maps its collaborator response into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginePayload {
    /// Domain category (e.g., "thyroid-metabolic")
    pub category: String,
    /// Headline finding
    pub finding: String,
    /// Engine's self-reported score (0-100)
    pub score: f64,
    /// Engine's self-reported confidence (0.0-1.0)
    pub confidence: f64,
    /// Severity of the finding
    pub severity: Severity,
    /// Engine's own risk label
    pub risk: RiskLevel,
    /// Finding must be acted on immediately
    #[serde(default)]
    pub immediate: bool,
    /// Evidence lines supporting the finding
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
    /// Recommendations proposed by the engine
    #[serde(default)]
    pub recommendations: Vec<EngineRecommendation>,
}

impl EnginePayload {
    /// Clamp score and confidence into their legal ranges (NaN becomes 0)
    pub fn normalized(mut self) -> Self {
        self.score = clamp_or_zero(self.score, 0.0, 100.0);
        self.confidence = clamp_or_zero(self.confidence, 0.0, 1.0);
        self
    }
}

/// Clamp a float into `[min, max]`, mapping NaN to zero
pub fn clamp_or_zero(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(min, max)
    }
}

/// Classification of an engine failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EngineErrorKind {
    /// Transport failure reaching the collaborator
    #[error("Network error: {0}")]
    Network(String),

    /// Collaborator rejected the request
    #[error("Provider error: {0}")]
    Provider(String),

    /// Collaborator answered with an unusable payload
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Engine has nothing to work with for this snapshot
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Engine task panicked or was aborted
    #[error("Engine panicked: {0}")]
    Panicked(String),
}

/// Outcome of one engine invocation; exactly one variant is active
#[derive(Debug, Clone, PartialEq)]
pub enum EngineResult {
    Success {
        kind: EngineKind,
        payload: EnginePayload,
        latency: Duration,
    },
    Failure {
        kind: EngineKind,
        error: EngineErrorKind,
        latency: Duration,
    },
    TimedOut {
        kind: EngineKind,
    },
}

impl EngineResult {
    pub fn kind(&self) -> EngineKind {
        match self {
            EngineResult::Success { kind, .. }
            | EngineResult::Failure { kind, .. }
            | EngineResult::TimedOut { kind } => *kind,
        }
    }

    pub fn payload(&self) -> Option<&EnginePayload> {
        match self {
            EngineResult::Success { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Outcome label used in logs and events
    pub fn outcome(&self) -> &'static str {
        match self {
            EngineResult::Success { .. } => "ok",
            EngineResult::Failure { .. } => "failed",
            EngineResult::TimedOut { .. } => "timed_out",
        }
    }
}

// ============================================================================
// Output: Synthesized Report
// ============================================================================

/// Per-engine status in the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine succeeded with usable confidence
    Ok,
    /// Engine succeeded but reported very low confidence
    Degraded,
    /// Engine failed or timed out
    Missing,
}

/// Deduplicated recommendation in priority order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritizedRecommendation {
    pub text: String,
    pub severity: Severity,
    /// Engines that proposed this recommendation, sorted
    pub supporting_engines: Vec<EngineKind>,
    /// At least one engine asked for immediate action
    #[serde(default)]
    pub immediate: bool,
}

/// Risk label plus the findings that drove it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub contributing_factors: Vec<String>,
}

/// Follow-up actions bucketed by timeframe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FollowUpSchedule {
    pub immediate: Vec<String>,
    pub short_term: Vec<String>,
    pub long_term: Vec<String>,
}

impl FollowUpSchedule {
    pub fn bucket_mut(&mut self, timeframe: Timeframe) -> &mut Vec<String> {
        match timeframe {
            Timeframe::Immediate => &mut self.immediate,
            Timeframe::ShortTerm => &mut self.short_term,
            Timeframe::LongTerm => &mut self.long_term,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.short_term.is_empty() && self.long_term.is_empty()
    }
}

/// Single synthesized insight report
///
/// Immutable once built. The cache and the response path share it through
/// an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedReport {
    pub subject_id: String,
    pub timestamp: DateTime<Utc>,
    /// Weighted overall score (0-100)
    pub overall_score: f64,
    /// Report confidence (0.0-1.0)
    pub confidence: f64,
    pub per_engine: BTreeMap<EngineKind, EngineStatus>,
    pub prioritized_recommendations: Vec<PrioritizedRecommendation>,
    pub risk_assessment: RiskAssessment,
    pub follow_up_schedule: FollowUpSchedule,
    /// One or more registered engines were missing
    pub degraded: bool,
    pub processing_time_ms: u64,
}

impl SynthesizedReport {
    /// Trimmed summary appended to the session context
    pub fn summary(&self, measurements: BTreeMap<String, f64>) -> ReportSummary {
        ReportSummary {
            timestamp: self.timestamp,
            overall_score: self.overall_score,
            confidence: self.confidence,
            risk: self.risk_assessment.level,
            top_recommendations: self
                .prioritized_recommendations
                .iter()
                .take(3)
                .map(|r| r.text.clone())
                .collect(),
            measurements,
        }
    }
}

// ============================================================================
// Enrichment: Session Context
// ============================================================================

/// Trimmed summary of a prior report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub timestamp: DateTime<Utc>,
    pub overall_score: f64,
    pub confidence: f64,
    pub risk: RiskLevel,
    pub top_recommendations: Vec<String>,
    /// Numeric measurements of the snapshot that produced the report
    #[serde(default)]
    pub measurements: BTreeMap<String, f64>,
}

/// Bounded, ordered sequence of prior report summaries for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub subject_id: String,
    pub session_id: String,
    /// Oldest first
    pub summaries: Vec<ReportSummary>,
}

impl SessionContext {
    pub fn new(subject_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            session_id: session_id.into(),
            summaries: Vec::new(),
        }
    }

    /// Append a summary, dropping the oldest beyond `max_summaries`
    pub fn push_bounded(&mut self, summary: ReportSummary, max_summaries: usize) {
        self.summaries.push(summary);
        if self.summaries.len() > max_summaries {
            let excess = self.summaries.len() - max_summaries;
            self.summaries.drain(..excess);
        }
    }

    /// Most recent `limit` summaries, oldest first
    pub fn recent(&self, limit: usize) -> &[ReportSummary] {
        let start = self.summaries.len().saturating_sub(limit);
        &self.summaries[start..]
    }

    /// Most recent prior value of a numeric measurement
    pub fn last_value(&self, measurement: &str) -> Option<f64> {
        self.summaries
            .iter()
            .rev()
            .find_map(|s| s.measurements.get(measurement).copied())
    }
}

// ============================================================================
// Errors crossing the core boundary
// ============================================================================

/// Errors returned by `Orchestrator::analyze`
///
/// Only input validation crosses the boundary as a hard failure; engine and
/// cache problems are absorbed into the report.
#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    /// Malformed or incomplete snapshot
    #[error("Invalid snapshot: {0}")]
    InputValidation(String),
}
