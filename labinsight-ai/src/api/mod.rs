//! HTTP API handlers for labinsight-ai
//!
//! Thin adapters over the orchestrator: request parsing, status mapping,
//! and response shaping only.

pub mod analyze;
pub mod health;
pub mod sessions;
pub mod sse;

pub use analyze::analyze_routes;
pub use health::health_routes;
pub use sessions::session_routes;
pub use sse::event_stream;
