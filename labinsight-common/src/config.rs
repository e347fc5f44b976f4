//! Bootstrap configuration loading and config file resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line argument (config path, port)
//! 2. Environment variable (`LABINSIGHT_CONFIG`, `LABINSIGHT_PORT`)
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing or unreadable TOML file never prevents startup: the service
//! logs a warning and falls back to compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "LABINSIGHT_CONFIG";

/// Default HTTP port for labinsight-ai
pub const DEFAULT_PORT: u16 = 8004;

/// Ceiling for deadlines and request timeouts (10 minutes)
pub const MAX_DEADLINE_MS: u64 = 10 * 60 * 1000;

/// Ceiling for cache time-to-live values (30 days)
pub const MAX_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Bootstrap configuration loaded from TOML file
///
/// Every field has a compiled default, so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Fan-out deadlines
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,

    /// Session memory cache sizing and retention
    #[serde(default)]
    pub cache: CacheSettings,

    /// External collaborator endpoints
    #[serde(default)]
    pub services: ServiceEndpoints,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    /// Used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Deadlines applied when fanning a snapshot out to the engines
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorSettings {
    /// Budget for the whole fan-out (milliseconds)
    #[serde(default = "default_global_deadline_ms")]
    pub global_deadline_ms: u64,

    /// Budget for any single engine (milliseconds)
    #[serde(default = "default_engine_deadline_ms")]
    pub engine_deadline_ms: u64,
}

/// Session memory cache sizing and retention
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    /// Maximum number of cached reports
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Report time-to-live (seconds)
    #[serde(default = "default_report_ttl_secs")]
    pub report_ttl_secs: u64,

    /// Maximum number of (subject, session) contexts retained
    #[serde(default = "default_context_capacity")]
    pub context_capacity: usize,

    /// Session context time-to-live since last append (seconds)
    #[serde(default = "default_context_ttl_secs")]
    pub context_ttl_secs: u64,

    /// Prior report summaries kept per session context
    #[serde(default = "default_max_context_summaries")]
    pub max_context_summaries: usize,
}

/// External collaborator endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceEndpoints {
    /// AI insight provider base URL
    #[serde(default = "default_insight_url")]
    pub insight_url: String,

    /// Session/context store base URL
    #[serde(default = "default_context_store_url")]
    pub context_store_url: String,

    /// Transport timeout for collaborator HTTP calls (milliseconds)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_global_deadline_ms() -> u64 {
    5_000
}

fn default_engine_deadline_ms() -> u64 {
    3_000
}

fn default_cache_capacity() -> usize {
    1_000
}

fn default_report_ttl_secs() -> u64 {
    2 * 60 * 60 // 2 hours
}

fn default_context_capacity() -> usize {
    10_000
}

fn default_context_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_context_summaries() -> usize {
    10
}

fn default_insight_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_context_store_url() -> String {
    "http://localhost:8002".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            logging: LoggingConfig::default(),
            orchestrator: OrchestratorSettings::default(),
            cache: CacheSettings::default(),
            services: ServiceEndpoints::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            global_deadline_ms: default_global_deadline_ms(),
            engine_deadline_ms: default_engine_deadline_ms(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            report_ttl_secs: default_report_ttl_secs(),
            context_capacity: default_context_capacity(),
            context_ttl_secs: default_context_ttl_secs(),
            max_context_summaries: default_max_context_summaries(),
        }
    }
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            insight_url: default_insight_url(),
            context_store_url: default_context_store_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl TomlConfig {
    /// Check loaded values and repair the ones that can be repaired
    ///
    /// Zero deadlines and zero capacities are rejected. Deadlines and
    /// time-to-live values beyond their ceilings are clamped with a warning,
    /// as is an engine deadline longer than the global deadline.
    pub fn validate(mut self) -> Result<Self> {
        if self.orchestrator.global_deadline_ms == 0 {
            return Err(Error::Config(
                "orchestrator.global_deadline_ms must be greater than zero".to_string(),
            ));
        }
        if self.orchestrator.engine_deadline_ms == 0 {
            return Err(Error::Config(
                "orchestrator.engine_deadline_ms must be greater than zero".to_string(),
            ));
        }
        if self.cache.capacity == 0 || self.cache.context_capacity == 0 {
            return Err(Error::Config(
                "cache.capacity and cache.context_capacity must be greater than zero".to_string(),
            ));
        }
        if self.cache.max_context_summaries == 0 {
            return Err(Error::Config(
                "cache.max_context_summaries must be greater than zero".to_string(),
            ));
        }

        clamp_to_ceiling(
            "orchestrator.global_deadline_ms",
            &mut self.orchestrator.global_deadline_ms,
            MAX_DEADLINE_MS,
        );
        clamp_to_ceiling(
            "orchestrator.engine_deadline_ms",
            &mut self.orchestrator.engine_deadline_ms,
            MAX_DEADLINE_MS,
        );
        clamp_to_ceiling("cache.report_ttl_secs", &mut self.cache.report_ttl_secs, MAX_TTL_SECS);
        clamp_to_ceiling("cache.context_ttl_secs", &mut self.cache.context_ttl_secs, MAX_TTL_SECS);
        clamp_to_ceiling(
            "services.request_timeout_ms",
            &mut self.services.request_timeout_ms,
            MAX_DEADLINE_MS,
        );

        if self.orchestrator.engine_deadline_ms > self.orchestrator.global_deadline_ms {
            warn!(
                engine_deadline_ms = self.orchestrator.engine_deadline_ms,
                global_deadline_ms = self.orchestrator.global_deadline_ms,
                "Engine deadline exceeds global deadline; clamping"
            );
            self.orchestrator.engine_deadline_ms = self.orchestrator.global_deadline_ms;
        }

        Ok(self)
    }
}

fn clamp_to_ceiling(key: &str, value: &mut u64, ceiling: u64) {
    if *value > ceiling {
        warn!(key, value = *value, ceiling, "Configured value exceeds ceiling; clamping");
        *value = ceiling;
    }
}

/// Config file resolution for one service
///
/// Priority order:
/// 1. Explicit path (command-line argument)
/// 2. `LABINSIGHT_CONFIG` environment variable
/// 3. `~/.config/labinsight/<service>.toml`
/// 4. `/etc/labinsight/<service>.toml` (Linux only)
pub struct ConfigResolver {
    service_name: String,
}

impl ConfigResolver {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Resolve the config file path, if any candidate applies
    ///
    /// Explicit and environment paths are returned even when the file does
    /// not exist so the loader can warn about them; discovered locations are
    /// only returned when present.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = cli_arg {
            return Some(path.to_path_buf());
        }

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        self.default_locations().into_iter().find(|p| p.exists())
    }

    /// Platform config locations, in search order
    pub fn default_locations(&self) -> Vec<PathBuf> {
        let file_name = format!("{}.toml", self.service_name);
        let mut locations = Vec::new();

        if let Some(dir) = dirs::config_dir() {
            locations.push(dir.join("labinsight").join(&file_name));
        }
        if cfg!(target_os = "linux") {
            locations.push(PathBuf::from("/etc/labinsight").join(&file_name));
        }

        locations
    }
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Write config to disk atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}
