//! Analysis Engines
//!
//! Four independent engines analyze each snapshot concurrently:
//! 1. **metabolic** - thyroid / metabolic reading of labs and vitals (insight provider)
//! 2. **pattern** - patterns across groups and against recent history (insight provider)
//! 3. **recommendation** - actionable lifestyle guidance (insight provider)
//! 4. **memory_enrichment** - health-journey trends from the session context (context store)
//!
//! Every engine implements `AnalysisEngine`. The orchestrator never calls an
//! engine directly; it goes through `EngineAdapter`, which isolates the
//! engine on its own task and enforces the deadline, so a slow, failing, or
//! panicking engine always becomes a typed `EngineResult`.

pub mod memory_enrichment;
pub mod metabolic;
pub mod pattern;
pub mod prompt;
pub mod recommendation;

pub use memory_enrichment::MemoryEnrichmentEngine;
pub use metabolic::MetabolicEngine;
pub use pattern::PatternEngine;
pub use recommendation::RecommendationEngine;

use crate::clients::{ContextStore, InsightProvider};
use crate::types::{
    EngineErrorKind, EngineKind, EnginePayload, EngineResult, HealthSnapshot, SessionContext,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// One independent analysis unit
///
/// Implementations translate collaborator responses into the normalized
/// `EnginePayload` and classify every failure as an `EngineErrorKind`.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Analyze one snapshot, optionally informed by the session's history
    async fn analyze(
        &self,
        snapshot: &HealthSnapshot,
        context: &SessionContext,
    ) -> Result<EnginePayload, EngineErrorKind>;
}

/// Deadline-enforcing wrapper around one engine
#[derive(Clone)]
pub struct EngineAdapter {
    engine: Arc<dyn AnalysisEngine>,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn AnalysisEngine>) -> Self {
        Self { engine }
    }

    pub fn kind(&self) -> EngineKind {
        self.engine.kind()
    }

    /// Run the engine on its own task, bounded by `deadline`
    ///
    /// Never returns an error: failures, panics, and deadline overruns are
    /// all folded into the `EngineResult`. A task still running at the
    /// deadline is detached and its eventual result discarded.
    pub async fn invoke(
        &self,
        snapshot: Arc<HealthSnapshot>,
        context: Arc<SessionContext>,
        deadline: Instant,
    ) -> EngineResult {
        let kind = self.engine.kind();
        let engine = Arc::clone(&self.engine);
        let started = Instant::now();

        let handle =
            tokio::spawn(async move { engine.analyze(snapshot.as_ref(), context.as_ref()).await });

        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(Ok(payload))) => {
                let latency = started.elapsed();
                debug!(engine = %kind, latency_ms = latency.as_millis() as u64, "Engine succeeded");
                EngineResult::Success {
                    kind,
                    payload: payload.normalized(),
                    latency,
                }
            }
            Ok(Ok(Err(error))) => {
                warn!(engine = %kind, error = %error, "Engine failed");
                EngineResult::Failure {
                    kind,
                    error,
                    latency: started.elapsed(),
                }
            }
            Ok(Err(join_error)) => {
                warn!(engine = %kind, error = %join_error, "Engine task aborted");
                EngineResult::Failure {
                    kind,
                    error: EngineErrorKind::Panicked(join_error.to_string()),
                    latency: started.elapsed(),
                }
            }
            Err(_) => {
                // Dropping the JoinHandle detaches the task; whatever it
                // produces later is never observed.
                warn!(engine = %kind, "Engine exceeded deadline");
                EngineResult::TimedOut { kind }
            }
        }
    }
}

/// Fixed set of engines known at startup
#[derive(Clone, Default)]
pub struct EngineRegistry {
    adapters: Vec<EngineAdapter>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four production engines
    pub fn standard(
        provider: Arc<dyn InsightProvider>,
        context_store: Arc<dyn ContextStore>,
    ) -> Self {
        Self::new()
            .with_engine(Arc::new(MetabolicEngine::new(Arc::clone(&provider))))
            .with_engine(Arc::new(PatternEngine::new(Arc::clone(&provider))))
            .with_engine(Arc::new(RecommendationEngine::new(provider)))
            .with_engine(Arc::new(MemoryEnrichmentEngine::new(context_store)))
    }

    /// Add an engine; an engine of the same kind is replaced
    pub fn with_engine(mut self, engine: Arc<dyn AnalysisEngine>) -> Self {
        let kind = engine.kind();
        self.adapters.retain(|a| a.kind() != kind);
        self.adapters.push(EngineAdapter::new(engine));
        self
    }

    pub fn adapters(&self) -> &[EngineAdapter] {
        &self.adapters
    }

    /// Registered kinds, in registration order
    pub fn kinds(&self) -> Vec<EngineKind> {
        self.adapters.iter().map(EngineAdapter::kind).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
