//! Analysis Orchestrator
//!
//! Coordinates one request end to end:
//! 1. Validate the snapshot (rejections never touch engines or cache)
//! 2. Fingerprint and check the session memory cache
//! 3. Load the session context (best-effort)
//! 4. Fan out to every registered engine under a global and a per-engine deadline
//! 5. Synthesize, cache, and append the summary to the session context
//!
//! Engine failures and timeouts only ever degrade the report. An
//! unavailable cache is bypassed with a warning.

use crate::cache::SessionMemoryCache;
use crate::clients::ContextStore;
use crate::engines::EngineRegistry;
use crate::fingerprint::RequestFingerprint;
use crate::synthesis::{synthesize, SynthesisInput};
use crate::types::{
    AnalysisError, EngineResult, HealthSnapshot, SessionContext, SynthesizedReport,
};
use chrono::Utc;
use futures::future::join_all;
use labinsight_common::config::TomlConfig;
use labinsight_common::events::{EventBus, InsightEvent};
use labinsight_common::time::{duration_to_millis, instant_after};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Orchestrator deadlines and retention
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Budget for the whole fan-out
    pub global_deadline: Duration,
    /// Budget for any single engine (never beyond the global deadline)
    pub engine_deadline: Duration,
    /// Time-to-live of cached reports
    pub report_ttl: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            global_deadline: Duration::from_millis(5_000),
            engine_deadline: Duration::from_millis(3_000),
            report_ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml(config: &TomlConfig) -> Self {
        Self {
            global_deadline: Duration::from_millis(config.orchestrator.global_deadline_ms),
            engine_deadline: Duration::from_millis(config.orchestrator.engine_deadline_ms),
            report_ttl: Duration::from_secs(config.cache.report_ttl_secs),
        }
    }
}

/// Result of one `analyze` call
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: Arc<SynthesizedReport>,
    pub fingerprint: RequestFingerprint,
    /// Served from the session memory cache
    pub cached: bool,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: EngineRegistry,
    cache: Arc<SessionMemoryCache>,
    context_store: Option<Arc<dyn ContextStore>>,
    event_bus: Option<EventBus>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        registry: EngineRegistry,
        cache: Arc<SessionMemoryCache>,
    ) -> Self {
        Self {
            config,
            registry,
            cache,
            context_store: None,
            event_bus: None,
        }
    }

    /// Persist session contexts to an external store after each analysis
    pub fn with_context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context_store = Some(store);
        self
    }

    /// Publish progress events
    pub fn with_events(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<SessionMemoryCache> {
        &self.cache
    }

    /// Analyze one snapshot within a session
    ///
    /// # Errors
    /// `AnalysisError::InputValidation` for a blank subject or missing
    /// timestamp. No other failure crosses this boundary.
    pub async fn analyze(
        &self,
        snapshot: HealthSnapshot,
        session_id: &str,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let timestamp = snapshot.validate()?;
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let subject_id = snapshot.subject_id.clone();

        let fingerprint = RequestFingerprint::compute(&subject_id, session_id, &snapshot)
            .map_err(|e| AnalysisError::InputValidation(e.to_string()))?;

        match self.cache.get(&fingerprint).await {
            Ok(Some(report)) => {
                debug!(fingerprint = %fingerprint, "Serving cached report");
                self.emit(InsightEvent::CacheHit {
                    request_id,
                    fingerprint: fingerprint.to_hex(),
                    timestamp: Utc::now(),
                });
                return Ok(AnalysisOutcome {
                    report,
                    fingerprint,
                    cached: true,
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Cache lookup failed; bypassing cache"),
        }

        info!(
            request_id = %request_id,
            subject_id = %subject_id,
            fingerprint = %fingerprint,
            engines = self.registry.len(),
            "Analysis started"
        );
        self.emit(InsightEvent::AnalysisStarted {
            request_id,
            subject_id: subject_id.clone(),
            fingerprint: fingerprint.to_hex(),
            timestamp: Utc::now(),
        });

        let context = self.load_context(&subject_id, session_id).await;
        let snapshot = Arc::new(snapshot);
        let results = self
            .fan_out(request_id, Arc::clone(&snapshot), Arc::new(context))
            .await;

        let registered = self.registry.kinds();
        let report = Arc::new(synthesize(&SynthesisInput {
            subject_id: &subject_id,
            timestamp,
            registered: &registered,
            results: &results,
            elapsed: started.elapsed(),
        }));

        if let Err(e) = self
            .cache
            .put(fingerprint, Arc::clone(&report), self.config.report_ttl)
            .await
        {
            warn!(error = %e, "Cache write failed; report not cached");
        }
        self.remember(&snapshot, session_id, &report).await;

        info!(
            request_id = %request_id,
            overall_score = report.overall_score,
            confidence = report.confidence,
            degraded = report.degraded,
            processing_time_ms = report.processing_time_ms,
            "Analysis complete"
        );
        self.emit(InsightEvent::AnalysisCompleted {
            request_id,
            fingerprint: fingerprint.to_hex(),
            overall_score: report.overall_score,
            confidence: report.confidence,
            degraded: report.degraded,
            processing_time_ms: report.processing_time_ms,
            timestamp: Utc::now(),
        });

        Ok(AnalysisOutcome {
            report,
            fingerprint,
            cached: false,
        })
    }

    /// Drop a cached report; returns whether one was removed
    pub async fn invalidate(&self, fingerprint: &RequestFingerprint) -> bool {
        let removed = match self.cache.invalidate(fingerprint).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Cache invalidation failed");
                false
            }
        };

        info!(fingerprint = %fingerprint, removed, "Cache invalidation");
        self.emit(InsightEvent::CacheInvalidated {
            fingerprint: fingerprint.to_hex(),
            removed,
            timestamp: Utc::now(),
        });
        removed
    }

    /// Session context for display: cache first, then the external store
    pub async fn session_context(
        &self,
        subject_id: &str,
        session_id: &str,
    ) -> Option<SessionContext> {
        match self.cache.get_context(subject_id, session_id).await {
            Ok(Some(context)) => return Some(context),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Context lookup failed; trying context store"),
        }

        let store = self.context_store.as_ref()?;
        match store.read(subject_id, session_id).await {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, subject_id, session_id, "Context store read failed");
                None
            }
        }
    }

    /// Session context for the engines; an empty context when none is available
    ///
    /// A cache miss falls back to the external store and seeds the cache
    /// with what it returns, so the next append extends the stored history
    /// instead of replacing it.
    async fn load_context(&self, subject_id: &str, session_id: &str) -> SessionContext {
        match self.cache.get_context(subject_id, session_id).await {
            Ok(Some(context)) => return context,
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Context lookup failed; continuing without history");
                return SessionContext::new(subject_id, session_id);
            }
        }

        if let Some(store) = &self.context_store {
            match store.read(subject_id, session_id).await {
                Ok(Some(context)) => {
                    debug!(
                        subject_id,
                        session_id,
                        summaries = context.summaries.len(),
                        "Seeding session context from store"
                    );
                    if let Err(e) = self.cache.put_context(context.clone()).await {
                        warn!(error = %e, "Context seed failed; stored history may be overwritten");
                    }
                    return context;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, subject_id, session_id, "Context store read failed"),
            }
        }

        SessionContext::new(subject_id, session_id)
    }

    /// Invoke every registered engine concurrently
    ///
    /// Each engine gets `min(engine_deadline, global_deadline)` from the
    /// start of the fan-out, so the whole fan-out resolves by the global
    /// deadline. Results come back in registry order.
    async fn fan_out(
        &self,
        request_id: Uuid,
        snapshot: Arc<HealthSnapshot>,
        context: Arc<SessionContext>,
    ) -> Vec<EngineResult> {
        let started = Instant::now();
        let global_deadline = instant_after(started, self.config.global_deadline);
        let engine_deadline =
            instant_after(started, self.config.engine_deadline).min(global_deadline);

        let invocations = self.registry.adapters().iter().map(|adapter| {
            let snapshot = Arc::clone(&snapshot);
            let context = Arc::clone(&context);
            async move {
                let result = adapter.invoke(snapshot, context, engine_deadline).await;
                let latency = match &result {
                    EngineResult::Success { latency, .. } | EngineResult::Failure { latency, .. } => {
                        *latency
                    }
                    EngineResult::TimedOut { .. } => engine_deadline.duration_since(started),
                };
                self.emit(InsightEvent::EngineCompleted {
                    request_id,
                    engine: result.kind().to_string(),
                    outcome: result.outcome().to_string(),
                    latency_ms: duration_to_millis(latency),
                    timestamp: Utc::now(),
                });
                result
            }
        });

        join_all(invocations).await
    }

    /// Append the report summary to the session context and persist it
    async fn remember(&self, snapshot: &HealthSnapshot, session_id: &str, report: &SynthesizedReport) {
        let summary = report.summary(snapshot.numeric_measurements());
        let context = match self
            .cache
            .append_context(&snapshot.subject_id, session_id, summary)
            .await
        {
            Ok(context) => context,
            Err(e) => {
                warn!(error = %e, "Context append failed; session history not updated");
                return;
            }
        };

        let Some(store) = self.context_store.as_ref().map(Arc::clone) else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = store.write(&context).await {
                warn!(
                    error = %e,
                    subject_id = %context.subject_id,
                    session_id = %context.session_id,
                    "Failed to persist session context"
                );
            }
        });
    }

    fn emit(&self, event: InsightEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::engines::mock::MockEngine;
    use crate::types::{EngineKind, EngineStatus};

    fn orchestrator(registry: EngineRegistry) -> Orchestrator {
        Orchestrator::new(
            OrchestratorConfig::default(),
            registry,
            Arc::new(SessionMemoryCache::new(CacheConfig::default())),
        )
    }

    fn snapshot() -> HealthSnapshot {
        HealthSnapshot::new("u1", Utc::now())
    }

    #[tokio::test]
    async fn test_invalid_snapshot_rejected_before_engines() {
        let engine = Arc::new(MockEngine::new(EngineKind::Metabolic, 60.0, 0.8));
        let orch = orchestrator(EngineRegistry::new().with_engine(engine.clone()));

        let mut bad = snapshot();
        bad.timestamp = None;
        let err = orch.analyze(bad, "s1").await.unwrap_err();

        assert!(matches!(err, AnalysisError::InputValidation(_)));
        assert_eq!(engine.calls(), 0);
        assert_eq!(orch.cache().stats().await.reports, 0);
    }

    #[tokio::test]
    async fn test_second_call_served_from_cache() {
        let engine = Arc::new(MockEngine::new(EngineKind::Metabolic, 60.0, 0.8));
        let orch = orchestrator(EngineRegistry::new().with_engine(engine.clone()));
        let snap = snapshot();

        let first = orch.analyze(snap.clone(), "s1").await.unwrap();
        let second = orch.analyze(snap, "s1").await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert!(Arc::ptr_eq(&first.report, &second.report));
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_summary_appended_to_context() {
        let orch = orchestrator(
            EngineRegistry::new()
                .with_engine(Arc::new(MockEngine::new(EngineKind::Pattern, 60.0, 0.8))),
        );
        orch.analyze(snapshot(), "s1").await.unwrap();

        let ctx = orch.session_context("u1", "s1").await.unwrap();
        assert_eq!(ctx.summaries.len(), 1);
        assert_eq!(ctx.summaries[0].overall_score, 60.0);
    }

    #[tokio::test]
    async fn test_unavailable_cache_is_bypassed() {
        let engine = Arc::new(MockEngine::new(EngineKind::Metabolic, 60.0, 0.8));
        let orch = orchestrator(EngineRegistry::new().with_engine(engine.clone()));
        orch.cache().shutdown().await;

        let outcome = orch.analyze(snapshot(), "s1").await.unwrap();
        assert!(!outcome.cached);
        assert_eq!(
            outcome.report.per_engine[&EngineKind::Metabolic],
            EngineStatus::Ok
        );

        orch.analyze(snapshot(), "s1").await.unwrap();
        assert_eq!(engine.calls(), 2);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();
        let orch = orchestrator(
            EngineRegistry::new()
                .with_engine(Arc::new(MockEngine::new(EngineKind::Metabolic, 60.0, 0.8))),
        )
        .with_events(bus);

        orch.analyze(snapshot(), "s1").await.unwrap();

        let types: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event_type().to_string())
            .collect();
        assert_eq!(
            types,
            vec!["AnalysisStarted", "EngineCompleted", "AnalysisCompleted"]
        );
    }
}
