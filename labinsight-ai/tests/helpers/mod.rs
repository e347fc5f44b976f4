//! Shared fixtures for labinsight-ai integration tests
//!
//! - `TestEngine`: configurable engine (delay, failure, panic, payload)
//! - `StubProvider`: insight provider returning a fixed answer or error
//! - snapshot, report, and orchestrator builders

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use labinsight_ai::cache::{CacheConfig, SessionMemoryCache};
use labinsight_ai::clients::{
    InsightProvider, ProviderAnswer, ProviderError, ProviderRequest, ServiceHealth,
};
use labinsight_ai::engines::{AnalysisEngine, EngineRegistry};
use labinsight_ai::types::{
    EngineErrorKind, EngineKind, EnginePayload, EngineRecommendation, FollowUpSchedule,
    HealthSnapshot, MeasurementValue, RiskAssessment, RiskLevel, SessionContext, Severity,
    SynthesizedReport,
};
use labinsight_ai::{Orchestrator, OrchestratorConfig};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Engines
// ============================================================================

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    /// Fail until this many calls have been made, then succeed
    FailFirst(usize),
    Panic,
}

/// Configurable engine; the invocation counter is shared across clones
#[derive(Clone)]
pub struct TestEngine {
    kind: EngineKind,
    payload: EnginePayload,
    delay: Duration,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
    completed: Arc<AtomicUsize>,
}

impl TestEngine {
    pub fn new(kind: EngineKind, score: f64, confidence: f64) -> Self {
        Self {
            kind,
            payload: EnginePayload {
                category: kind.as_str().to_string(),
                finding: format!("{} finding", kind),
                score,
                confidence,
                severity: Severity::Low,
                risk: RiskLevel::Low,
                immediate: false,
                supporting_evidence: vec![],
                recommendations: vec![],
            },
            delay: Duration::ZERO,
            behavior: Behavior::Succeed,
            calls: Arc::new(AtomicUsize::new(0)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(kind: EngineKind) -> Self {
        let mut engine = Self::new(kind, 0.0, 0.0);
        engine.behavior = Behavior::Fail;
        engine
    }

    /// Fails its first `failures` invocations, then succeeds
    pub fn recovering(kind: EngineKind, failures: usize) -> Self {
        let mut engine = Self::new(kind, 60.0, 0.8);
        engine.behavior = Behavior::FailFirst(failures);
        engine
    }

    pub fn panicking(kind: EngineKind) -> Self {
        let mut engine = Self::new(kind, 0.0, 0.0);
        engine.behavior = Behavior::Panic;
        engine
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel, severity: Severity) -> Self {
        self.payload.risk = risk;
        self.payload.severity = severity;
        self
    }

    pub fn with_finding(mut self, finding: &str) -> Self {
        self.payload.finding = finding.to_string();
        self
    }

    pub fn with_recommendation(mut self, text: &str, severity: Severity) -> Self {
        self.payload
            .recommendations
            .push(EngineRecommendation::new(text, severity));
        self
    }

    pub fn with_immediate_recommendation(mut self, text: &str, severity: Severity) -> Self {
        self.payload
            .recommendations
            .push(EngineRecommendation::new(text, severity).immediate());
        self
    }

    /// Times `analyze` was entered
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Times `analyze` ran to completion (including late completions)
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn shared(&self) -> Arc<dyn AnalysisEngine> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl AnalysisEngine for TestEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    async fn analyze(
        &self,
        _snapshot: &HealthSnapshot,
        _context: &SessionContext,
    ) -> Result<EnginePayload, EngineErrorKind> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => Ok(self.payload.clone()),
            Behavior::Fail => Err(EngineErrorKind::Provider("test engine failure".to_string())),
            Behavior::FailFirst(failures) if call < failures => {
                Err(EngineErrorKind::Provider("test engine failure".to_string()))
            }
            Behavior::FailFirst(_) => Ok(self.payload.clone()),
            Behavior::Panic => panic!("test engine panic"),
        }
    }
}

pub fn registry(engines: &[&TestEngine]) -> EngineRegistry {
    engines
        .iter()
        .fold(EngineRegistry::new(), |r, e| r.with_engine(e.shared()))
}

// ============================================================================
// Provider
// ============================================================================

/// Insight provider with a scripted answer; records every prompt
pub struct StubProvider {
    answer: Result<ProviderAnswer, u16>,
    prompts: Mutex<Vec<String>>,
    healthy: bool,
}

impl StubProvider {
    pub fn answering(score: f64, confidence: f64, analysis: &str) -> Self {
        Self {
            answer: Ok(ProviderAnswer {
                analysis: analysis.to_string(),
                score: Some(score),
                confidence: Some(confidence),
                ..Default::default()
            }),
            prompts: Mutex::new(Vec::new()),
            healthy: true,
        }
    }

    /// Every call fails with the given HTTP status; health reports unhealthy
    pub fn rejecting(status: u16) -> Self {
        Self {
            answer: Err(status),
            prompts: Mutex::new(Vec::new()),
            healthy: false,
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InsightProvider for StubProvider {
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderAnswer, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        match &self.answer {
            Ok(answer) => Ok(answer.clone()),
            Err(status) => Err(ProviderError::Provider {
                status: *status,
                body: "rejected".to_string(),
            }),
        }
    }

    async fn health(&self) -> ServiceHealth {
        if self.healthy {
            ServiceHealth::healthy()
        } else {
            ServiceHealth::unhealthy(503)
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 8, 30, 0).unwrap()
}

/// Snapshot with vitals and labs
pub fn snapshot(subject_id: &str) -> HealthSnapshot {
    let mut snapshot = HealthSnapshot::new(subject_id, fixed_time());
    snapshot.vitals = Some(BTreeMap::from([
        ("pulse".to_string(), MeasurementValue::Number(74.0)),
        ("temperature".to_string(), MeasurementValue::Number(36.7)),
    ]));
    snapshot.lab_panels = Some(BTreeMap::from([
        ("glucose".to_string(), MeasurementValue::Number(88.0)),
        ("tsh".to_string(), MeasurementValue::Number(1.6)),
    ]));
    snapshot
}

pub fn report(subject_id: &str, score: f64) -> Arc<SynthesizedReport> {
    Arc::new(SynthesizedReport {
        subject_id: subject_id.to_string(),
        timestamp: fixed_time(),
        overall_score: score,
        confidence: 0.8,
        per_engine: BTreeMap::new(),
        prioritized_recommendations: vec![],
        risk_assessment: RiskAssessment {
            level: RiskLevel::Low,
            contributing_factors: vec![],
        },
        follow_up_schedule: FollowUpSchedule::default(),
        degraded: false,
        processing_time_ms: 5,
    })
}

pub fn cache(capacity: usize) -> Arc<SessionMemoryCache> {
    Arc::new(SessionMemoryCache::new(CacheConfig {
        capacity: NonZeroUsize::new(capacity).unwrap(),
        context_capacity: NonZeroUsize::new(capacity).unwrap(),
        context_ttl: Duration::from_secs(300),
        max_context_summaries: 5,
    }))
}

pub fn orchestrator_config(global_ms: u64, engine_ms: u64) -> OrchestratorConfig {
    OrchestratorConfig {
        global_deadline: Duration::from_millis(global_ms),
        engine_deadline: Duration::from_millis(engine_ms),
        report_ttl: Duration::from_secs(300),
    }
}

pub fn orchestrator(engines: &[&TestEngine]) -> Orchestrator {
    Orchestrator::new(orchestrator_config(2_000, 1_500), registry(engines), cache(64))
}

/// Four succeeding engines with distinct scores
pub fn four_engines() -> [TestEngine; 4] {
    [
        TestEngine::new(EngineKind::Metabolic, 72.0, 0.9),
        TestEngine::new(EngineKind::Pattern, 64.0, 0.8),
        TestEngine::new(EngineKind::Recommendation, 70.0, 0.85),
        TestEngine::new(EngineKind::MemoryEnrichment, 60.0, 0.7),
    ]
}
