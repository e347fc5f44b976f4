//! Event types and EventBus for LabInsight services
//!
//! Events are broadcast via [`EventBus`] and can be serialized for SSE
//! transmission. All events use the central [`InsightEvent`] enum for
//! exhaustive matching.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// LabInsight event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum InsightEvent {
    /// A snapshot passed validation and analysis began
    AnalysisStarted {
        /// Per-request correlation id
        request_id: Uuid,
        /// Subject the snapshot belongs to
        subject_id: String,
        /// Hex request fingerprint
        fingerprint: String,
        timestamp: DateTime<Utc>,
    },

    /// A cached report was served
    CacheHit {
        request_id: Uuid,
        fingerprint: String,
        timestamp: DateTime<Utc>,
    },

    /// One engine resolved (success, failure or timeout)
    EngineCompleted {
        request_id: Uuid,
        /// Engine kind (e.g., "metabolic")
        engine: String,
        /// Outcome label ("ok", "failed", "timed_out")
        outcome: String,
        /// Engine latency in milliseconds (deadline for timeouts)
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A fresh report was synthesized
    AnalysisCompleted {
        request_id: Uuid,
        fingerprint: String,
        /// Overall score (0-100)
        overall_score: f64,
        /// Report confidence (0.0-1.0)
        confidence: f64,
        /// True if one or more engines were missing
        degraded: bool,
        processing_time_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A cached report was removed by an administrative request
    CacheInvalidated {
        fingerprint: String,
        /// Whether an entry was actually removed
        removed: bool,
        timestamp: DateTime<Utc>,
    },
}

impl InsightEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            InsightEvent::AnalysisStarted { .. } => "AnalysisStarted",
            InsightEvent::CacheHit { .. } => "CacheHit",
            InsightEvent::EngineCompleted { .. } => "EngineCompleted",
            InsightEvent::AnalysisCompleted { .. } => "AnalysisCompleted",
            InsightEvent::CacheInvalidated { .. } => "CacheInvalidated",
        }
    }
}

/// Central event distribution bus
///
/// Uses `tokio::sync::broadcast` internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use labinsight_common::events::{EventBus, InsightEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(InsightEvent::CacheInvalidated {
///     fingerprint: "ab12".to_string(),
///     removed: false,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<InsightEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<InsightEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: InsightEvent,
    ) -> Result<usize, broadcast::error::SendError<InsightEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: InsightEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
