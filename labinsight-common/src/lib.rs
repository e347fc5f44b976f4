//! # LabInsight Common Library
//!
//! Shared code for LabInsight services including:
//! - Bootstrap configuration loading (TOML + environment)
//! - Event types and the broadcast EventBus
//! - SSE stream helpers
//! - Common error type
//! - Timestamp utilities

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
