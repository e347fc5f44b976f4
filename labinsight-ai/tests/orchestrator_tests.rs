//! Integration tests for the analysis orchestrator
//!
//! Timing tests use real sleeps with generous margins: engines run
//! concurrently, so total latency tracks the slowest engine, not the sum.

mod helpers;

use helpers::*;
use labinsight_ai::cache::{CacheConfig, SessionMemoryCache};
use labinsight_ai::clients::{ContextStore, InMemoryContextStore};
use labinsight_ai::engines::EngineRegistry;
use labinsight_ai::types::{
    AnalysisError, EngineKind, EngineStatus, RiskLevel, SessionContext, Severity,
};
use labinsight_ai::{Orchestrator, OrchestratorConfig};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_all_engines_succeed() {
    let engines = four_engines();
    let orch = orchestrator(&engines.iter().collect::<Vec<_>>());

    let outcome = orch.analyze(snapshot("user-1"), "session-1").await.unwrap();
    let report = &outcome.report;

    assert!(!outcome.cached);
    assert_eq!(report.per_engine.len(), 4);
    assert!(report.per_engine.values().all(|s| *s == EngineStatus::Ok));
    assert!(report.confidence > 0.7, "confidence was {}", report.confidence);
    assert!(!report.degraded);
    assert!((0.0..=100.0).contains(&report.overall_score));
    assert_eq!(report.subject_id, "user-1");
    assert_eq!(report.timestamp, fixed_time());
}

#[tokio::test]
async fn test_engines_run_concurrently() {
    let engines = [
        TestEngine::new(EngineKind::Metabolic, 70.0, 0.8).delayed(Duration::from_millis(200)),
        TestEngine::new(EngineKind::Pattern, 70.0, 0.8).delayed(Duration::from_millis(300)),
        TestEngine::new(EngineKind::Recommendation, 70.0, 0.8).delayed(Duration::from_millis(400)),
    ];
    let orch = orchestrator(&engines.iter().collect::<Vec<_>>());

    let started = Instant::now();
    let outcome = orch.analyze(snapshot("user-1"), "session-1").await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(400), "elapsed {:?}", elapsed);
    assert!(
        elapsed < Duration::from_millis(800),
        "engines ran sequentially: {:?}",
        elapsed
    );
    assert!(outcome.report.per_engine.values().all(|s| *s == EngineStatus::Ok));
}

// ============================================================================
// Degradation
// ============================================================================

#[tokio::test]
async fn test_slow_engine_times_out_and_report_degrades() {
    let [metabolic, _, recommendation, memory] = four_engines();
    let slow_pattern = TestEngine::new(EngineKind::Pattern, 64.0, 0.8).delayed(Duration::from_secs(3));

    let orch = Orchestrator::new(
        orchestrator_config(2_000, 300),
        registry(&[&metabolic, &slow_pattern, &recommendation, &memory]),
        cache(16),
    );

    let started = Instant::now();
    let outcome = orch.analyze(snapshot("user-1"), "session-1").await.unwrap();
    let elapsed = started.elapsed();

    let report = &outcome.report;
    assert_eq!(report.per_engine[&EngineKind::Pattern], EngineStatus::Missing);
    assert_eq!(report.per_engine[&EngineKind::Metabolic], EngineStatus::Ok);
    assert!(report.degraded);
    assert!(elapsed < Duration::from_millis(1_500), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_missing_engine_strictly_lowers_confidence() {
    let full = four_engines();
    let full_orch = orchestrator(&full.iter().collect::<Vec<_>>());
    let full_report = full_orch
        .analyze(snapshot("user-1"), "session-1")
        .await
        .unwrap()
        .report;

    let [metabolic, _, recommendation, memory] = four_engines();
    let failing = TestEngine::failing(EngineKind::Pattern);
    let partial_orch = orchestrator(&[&metabolic, &failing, &recommendation, &memory]);
    let partial_report = partial_orch
        .analyze(snapshot("user-1"), "session-1")
        .await
        .unwrap()
        .report;

    assert!(partial_report.confidence < full_report.confidence);
    assert_eq!(
        partial_report.per_engine[&EngineKind::Pattern],
        EngineStatus::Missing
    );
}

#[tokio::test]
async fn test_failures_and_panics_never_fail_the_request() {
    let metabolic = TestEngine::panicking(EngineKind::Metabolic);
    let pattern = TestEngine::failing(EngineKind::Pattern);
    let recommendation = TestEngine::new(EngineKind::Recommendation, 70.0, 0.8);
    let orch = orchestrator(&[&metabolic, &pattern, &recommendation]);

    let outcome = orch.analyze(snapshot("user-1"), "session-1").await.unwrap();
    let report = &outcome.report;

    assert_eq!(report.per_engine[&EngineKind::Metabolic], EngineStatus::Missing);
    assert_eq!(report.per_engine[&EngineKind::Pattern], EngineStatus::Missing);
    assert_eq!(report.per_engine[&EngineKind::Recommendation], EngineStatus::Ok);
    assert_eq!(report.overall_score, 70.0);
}

#[tokio::test]
async fn test_zero_successes_still_produce_report() {
    let engines = [
        TestEngine::failing(EngineKind::Metabolic),
        TestEngine::failing(EngineKind::Pattern),
    ];
    let orch = orchestrator(&engines.iter().collect::<Vec<_>>());

    let report = orch.analyze(snapshot("user-1"), "s").await.unwrap().report;
    assert_eq!(report.confidence, 0.0);
    assert_eq!(report.overall_score, 0.0);
    assert!(report.degraded);
    assert!(!report.prioritized_recommendations.is_empty());
}

#[tokio::test]
async fn test_global_deadline_bounds_fan_out() {
    let engines = [
        TestEngine::new(EngineKind::Metabolic, 70.0, 0.8).delayed(Duration::from_secs(2)),
        TestEngine::new(EngineKind::Pattern, 70.0, 0.8).delayed(Duration::from_secs(2)),
    ];
    let orch = Orchestrator::new(
        orchestrator_config(200, 1_500),
        registry(&engines.iter().collect::<Vec<_>>()),
        cache(16),
    );

    let started = Instant::now();
    let report = orch.analyze(snapshot("user-1"), "s").await.unwrap().report;

    assert!(started.elapsed() < Duration::from_millis(1_000));
    assert!(report
        .per_engine
        .values()
        .all(|s| *s == EngineStatus::Missing));
}

#[tokio::test]
async fn test_late_result_is_discarded() {
    let slow = TestEngine::new(EngineKind::Pattern, 99.0, 0.99).delayed(Duration::from_millis(300));
    let fast = TestEngine::new(EngineKind::Metabolic, 40.0, 0.8);
    let orch = Orchestrator::new(
        orchestrator_config(2_000, 100),
        registry(&[&fast, &slow]),
        cache(16),
    );

    let first = orch.analyze(snapshot("user-1"), "s").await.unwrap();
    assert_eq!(first.report.per_engine[&EngineKind::Pattern], EngineStatus::Missing);

    // Detached task finishes after the deadline
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(slow.completed(), 1);

    let again = orch.analyze(snapshot("user-1"), "s").await.unwrap();
    assert!(again.cached);
    assert_eq!(again.report.overall_score, 40.0);
    assert_eq!(again.report.per_engine[&EngineKind::Pattern], EngineStatus::Missing);
}

// ============================================================================
// Validation and caching
// ============================================================================

#[tokio::test]
async fn test_invalid_snapshot_touches_nothing() {
    let engines = four_engines();
    let orch = orchestrator(&engines.iter().collect::<Vec<_>>());

    let mut missing_time = snapshot("user-1");
    missing_time.timestamp = None;
    let blank_subject = snapshot("  ");

    for bad in [missing_time, blank_subject] {
        let err = orch.analyze(bad, "s").await.unwrap_err();
        assert!(matches!(err, AnalysisError::InputValidation(_)));
    }

    assert!(engines.iter().all(|e| e.calls() == 0));
    let stats = orch.cache().stats().await;
    assert_eq!(stats.reports, 0);
    assert_eq!(stats.contexts, 0);
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let engines = four_engines();
    let orch = orchestrator(&engines.iter().collect::<Vec<_>>());

    let first = orch.analyze(snapshot("user-1"), "session-1").await.unwrap();
    let second = orch.analyze(snapshot("user-1"), "session-1").await.unwrap();

    assert!(second.cached);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(*first.report, *second.report);
    assert!(engines.iter().all(|e| e.calls() == 1));
}

#[tokio::test]
async fn test_different_session_is_not_a_cache_hit() {
    let engines = four_engines();
    let orch = orchestrator(&engines.iter().collect::<Vec<_>>());

    orch.analyze(snapshot("user-1"), "session-1").await.unwrap();
    let other = orch.analyze(snapshot("user-1"), "session-2").await.unwrap();

    assert!(!other.cached);
    assert!(engines.iter().all(|e| e.calls() == 2));
}

#[tokio::test]
async fn test_invalidate_forces_recompute() {
    let engines = four_engines();
    let orch = orchestrator(&engines.iter().collect::<Vec<_>>());

    let first = orch.analyze(snapshot("user-1"), "session-1").await.unwrap();
    assert!(orch.invalidate(&first.fingerprint).await);
    assert!(!orch.invalidate(&first.fingerprint).await);

    let again = orch.analyze(snapshot("user-1"), "session-1").await.unwrap();
    assert!(!again.cached);
    assert!(engines.iter().all(|e| e.calls() == 2));
}

// ============================================================================
// Synthesis through the orchestrator
// ============================================================================

#[tokio::test]
async fn test_critical_finding_overrides_majority() {
    let engines = [
        TestEngine::new(EngineKind::Metabolic, 80.0, 0.9),
        TestEngine::new(EngineKind::Pattern, 80.0, 0.9),
        TestEngine::new(EngineKind::Recommendation, 30.0, 0.9)
            .with_risk(RiskLevel::High, Severity::Critical)
            .with_finding("Fasting glucose 310 mg/dL")
            .with_recommendation("Contact your physician today", Severity::Critical),
    ];
    let orch = orchestrator(&engines.iter().collect::<Vec<_>>());

    let report = orch.analyze(snapshot("user-1"), "s").await.unwrap().report;
    assert_eq!(report.risk_assessment.level, RiskLevel::Critical);
    assert_eq!(
        report.risk_assessment.contributing_factors,
        vec!["recommendation: Fasting glucose 310 mg/dL"]
    );
    assert_eq!(
        report.follow_up_schedule.immediate,
        vec!["Contact your physician today"]
    );
}

#[tokio::test]
async fn test_shared_recommendation_merged_across_engines() {
    let engines = [
        TestEngine::new(EngineKind::Metabolic, 70.0, 0.9)
            .with_recommendation("Eat breakfast within an hour of waking.", Severity::Moderate),
        TestEngine::new(EngineKind::Recommendation, 70.0, 0.9)
            .with_recommendation("eat breakfast within an hour of waking", Severity::Low)
            .with_recommendation("Walk after dinner", Severity::Low),
    ];
    let orch = orchestrator(&engines.iter().collect::<Vec<_>>());

    let report = orch.analyze(snapshot("user-1"), "s").await.unwrap().report;
    let recs = &report.prioritized_recommendations;
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].text, "Eat breakfast within an hour of waking.");
    assert_eq!(recs[0].severity, Severity::Moderate);
    assert_eq!(
        recs[0].supporting_engines,
        vec![EngineKind::Metabolic, EngineKind::Recommendation]
    );
    assert_eq!(report.follow_up_schedule.short_term, vec![recs[0].text.clone()]);
    assert_eq!(report.follow_up_schedule.long_term, vec!["Walk after dinner"]);
}

// ============================================================================
// Production engines with stub collaborators
// ============================================================================

#[tokio::test]
async fn test_standard_engines_with_stub_provider() {
    let provider = Arc::new(StubProvider::answering(
        68.0,
        0.8,
        "Metabolic markers are within range.\nConsider adding a protein-rich breakfast.",
    ));
    let store = Arc::new(InMemoryContextStore::new());
    let orch = Orchestrator::new(
        orchestrator_config(2_000, 1_500),
        EngineRegistry::standard(provider.clone(), store.clone()),
        cache(16),
    )
    .with_context_store(store.clone());

    let report = orch.analyze(snapshot("user-1"), "s1").await.unwrap().report;

    assert!(report.per_engine.values().all(|s| *s == EngineStatus::Ok));
    assert_eq!(provider.prompts().len(), 3);
    assert!(report
        .prioritized_recommendations
        .iter()
        .any(|r| r.text == "Consider adding a protein-rich breakfast."));

    // Context is persisted from a background task
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stored = store.read("user-1", "s1").await.unwrap().unwrap();
    assert_eq!(stored.summaries.len(), 1);
    assert_eq!(stored.summaries[0].measurements.get("glucose"), Some(&88.0));
}

#[tokio::test]
async fn test_rejecting_provider_degrades_three_engines() {
    let provider = Arc::new(StubProvider::rejecting(503));
    let store = Arc::new(InMemoryContextStore::new());
    let orch = Orchestrator::new(
        orchestrator_config(2_000, 1_500),
        EngineRegistry::standard(provider, store),
        cache(16),
    );

    let report = orch.analyze(snapshot("user-1"), "s1").await.unwrap().report;

    assert_eq!(report.per_engine[&EngineKind::Metabolic], EngineStatus::Missing);
    assert_eq!(report.per_engine[&EngineKind::Pattern], EngineStatus::Missing);
    assert_eq!(report.per_engine[&EngineKind::Recommendation], EngineStatus::Missing);
    assert_eq!(report.per_engine[&EngineKind::MemoryEnrichment], EngineStatus::Ok);
    assert!(report.degraded);
    assert_eq!(report.overall_score, 50.0);
}

#[tokio::test]
async fn test_history_reaches_later_prompts() {
    let provider = Arc::new(StubProvider::answering(
        68.0,
        0.8,
        "Stable.\nTry ten minutes of morning sunlight.",
    ));
    let store = Arc::new(InMemoryContextStore::new());
    let orch = Orchestrator::new(
        orchestrator_config(2_000, 1_500),
        EngineRegistry::standard(provider.clone(), store),
        cache(16),
    );

    orch.analyze(snapshot("user-1"), "s1").await.unwrap();

    let mut later = snapshot("user-1");
    later.timestamp = Some(fixed_time() + chrono::Duration::days(30));
    let report = orch.analyze(later, "s1").await.unwrap().report;

    let prompts = provider.prompts();
    assert_eq!(prompts.len(), 6);
    assert!(!prompts[0].contains("Previous health context"));
    assert!(prompts[5].contains("Previous health context"));
    assert!(prompts[5].contains("Try ten minutes of morning sunlight."));

    let ctx = orch.session_context("user-1", "s1").await.unwrap();
    assert_eq!(ctx.summaries.len(), 2);
    assert_eq!(report.per_engine[&EngineKind::MemoryEnrichment], EngineStatus::Ok);
}

// ============================================================================
// Session history across restarts
// ============================================================================

/// Store holding `scores.len()` prior summaries for user-1/s1
async fn seeded_store(scores: &[f64]) -> Arc<InMemoryContextStore> {
    let store = Arc::new(InMemoryContextStore::new());
    let mut context = SessionContext::new("user-1", "s1");
    for score in scores {
        context
            .summaries
            .push(report("user-1", *score).summary(BTreeMap::new()));
    }
    store.write(&context).await.unwrap();
    store
}

fn stored_scores(context: &SessionContext) -> Vec<f64> {
    context.summaries.iter().map(|s| s.overall_score).collect()
}

#[tokio::test]
async fn test_cold_cache_extends_stored_history() {
    let engines = four_engines();
    let store = seeded_store(&[41.0, 42.0, 43.0]).await;
    let orch = Orchestrator::new(
        orchestrator_config(2_000, 1_500),
        registry(&engines.iter().collect::<Vec<_>>()),
        cache(16),
    )
    .with_context_store(store.clone());

    let report = orch.analyze(snapshot("user-1"), "s1").await.unwrap().report;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stored = store.read("user-1", "s1").await.unwrap().unwrap();
    assert_eq!(stored.summaries.len(), 4);
    assert_eq!(stored_scores(&stored)[..3], [41.0, 42.0, 43.0]);
    assert_eq!(stored.summaries[3].overall_score, report.overall_score);

    let cached = orch.cache().get_context("user-1", "s1").await.unwrap().unwrap();
    assert_eq!(cached, stored);
}

#[tokio::test]
async fn test_seeded_history_still_bounded() {
    let engines = four_engines();
    let store = seeded_store(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]).await;
    let orch = Orchestrator::new(
        orchestrator_config(2_000, 1_500),
        registry(&engines.iter().collect::<Vec<_>>()),
        cache(16),
    )
    .with_context_store(store.clone());

    orch.analyze(snapshot("user-1"), "s1").await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stored = store.read("user-1", "s1").await.unwrap().unwrap();
    // cache(16) keeps five summaries: the newest four seeded plus this one
    assert_eq!(stored.summaries.len(), 5);
    assert_eq!(stored_scores(&stored)[..4], [4.0, 5.0, 6.0, 7.0]);
}

#[tokio::test]
async fn test_other_session_does_not_inherit_stored_history() {
    let engines = four_engines();
    let store = seeded_store(&[41.0, 42.0]).await;
    let orch = Orchestrator::new(
        orchestrator_config(2_000, 1_500),
        registry(&engines.iter().collect::<Vec<_>>()),
        cache(16),
    )
    .with_context_store(store.clone());

    orch.analyze(snapshot("user-1"), "s2").await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.read("user-1", "s2").await.unwrap().unwrap().summaries.len(), 1);
    assert_eq!(store.read("user-1", "s1").await.unwrap().unwrap().summaries.len(), 2);
}

// ============================================================================
// Extreme durations
// ============================================================================

#[tokio::test]
async fn test_unbounded_durations_do_not_panic() {
    let engines = four_engines();
    let config = OrchestratorConfig {
        global_deadline: Duration::MAX,
        engine_deadline: Duration::MAX,
        report_ttl: Duration::from_secs(u64::MAX),
    };
    let cache = Arc::new(SessionMemoryCache::new(CacheConfig {
        capacity: NonZeroUsize::new(8).unwrap(),
        context_capacity: NonZeroUsize::new(8).unwrap(),
        context_ttl: Duration::MAX,
        max_context_summaries: 5,
    }));
    let orch = Orchestrator::new(config, registry(&engines.iter().collect::<Vec<_>>()), cache);

    let first = orch.analyze(snapshot("user-1"), "s1").await.unwrap();
    assert!(!first.cached);
    assert!(first.report.per_engine.values().all(|s| *s == EngineStatus::Ok));

    let second = orch.analyze(snapshot("user-1"), "s1").await.unwrap();
    assert!(second.cached);
    assert_eq!(
        orch.session_context("user-1", "s1").await.unwrap().summaries.len(),
        1
    );
}
