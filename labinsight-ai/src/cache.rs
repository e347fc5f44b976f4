//! Session Memory Cache
//!
//! Two bounded stores behind async mutexes:
//! - **reports:** `RequestFingerprint` → shared `SynthesizedReport`, each
//!   entry with its own time-to-live
//! - **contexts:** `(subject, session)` → `SessionContext`, refreshed on
//!   every append
//!
//! Eviction order: expired entries first, then least-recently-used among
//! live entries. Reads promote entries to most-recently-used.
//!
//! After `shutdown()` every operation returns `CacheError::Unavailable`.

use crate::fingerprint::RequestFingerprint;
use crate::types::{ReportSummary, SessionContext, SynthesizedReport};
use labinsight_common::time::instant_after;
use lru::LruCache;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Cache failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CacheError {
    /// Cache has been shut down
    #[error("Session memory cache is unavailable")]
    Unavailable,
}

/// Cache sizing and retention
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: NonZeroUsize,
    pub context_capacity: NonZeroUsize,
    pub context_ttl: Duration,
    pub max_context_summaries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::new(1_000).unwrap_or(NonZeroUsize::MIN),
            context_capacity: NonZeroUsize::new(10_000).unwrap_or(NonZeroUsize::MIN),
            context_ttl: Duration::from_secs(24 * 60 * 60),
            max_context_summaries: 10,
        }
    }
}

impl CacheConfig {
    /// Build from bootstrap settings; zero capacities fall back to one
    pub fn from_settings(settings: &labinsight_common::config::CacheSettings) -> Self {
        Self {
            capacity: NonZeroUsize::new(settings.capacity).unwrap_or(NonZeroUsize::MIN),
            context_capacity: NonZeroUsize::new(settings.context_capacity)
                .unwrap_or(NonZeroUsize::MIN),
            context_ttl: Duration::from_secs(settings.context_ttl_secs),
            max_context_summaries: settings.max_context_summaries.max(1),
        }
    }
}

/// Counter snapshot reported on `/health`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub reports: usize,
    pub contexts: usize,
}

impl CacheStats {
    /// Fraction of report lookups that hit (0.0 when nothing was looked up)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct ReportEntry {
    report: Arc<SynthesizedReport>,
    inserted_at: Instant,
    last_accessed_at: Instant,
    expires_at: Instant,
}

struct ContextEntry {
    context: SessionContext,
    expires_at: Instant,
}

/// One bounded store plus its open/closed state
struct Store<K: std::hash::Hash + Eq, V> {
    entries: LruCache<K, V>,
    open: bool,
}

impl<K: std::hash::Hash + Eq, V> Store<K, V> {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            open: true,
        }
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.open {
            Ok(())
        } else {
            Err(CacheError::Unavailable)
        }
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= self.entries.cap().get()
    }
}

type ContextKey = (String, String);

/// Bounded, TTL-aware store of reports and session contexts
///
/// Safe to share across request tasks (`Arc<SessionMemoryCache>`).
pub struct SessionMemoryCache {
    reports: Mutex<Store<RequestFingerprint, ReportEntry>>,
    contexts: Mutex<Store<ContextKey, ContextEntry>>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl SessionMemoryCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            reports: Mutex::new(Store::new(config.capacity)),
            contexts: Mutex::new(Store::new(config.context_capacity)),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ========================================================================
    // Reports
    // ========================================================================

    /// Look up a live report, promoting it to most-recently-used
    ///
    /// Expired entries are removed and reported as absent.
    pub async fn get(
        &self,
        fingerprint: &RequestFingerprint,
    ) -> Result<Option<Arc<SynthesizedReport>>, CacheError> {
        let mut store = self.reports.lock().await;
        store.ensure_open()?;
        let now = Instant::now();

        let expired = match store.entries.peek(fingerprint) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return Ok(None);
            }
            Some(entry) => entry.expires_at <= now,
        };

        if expired {
            store.entries.pop(fingerprint);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %fingerprint, "Cached report expired");
            return Ok(None);
        }

        match store.entries.get_mut(fingerprint) {
            Some(entry) => {
                entry.last_accessed_at = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    fingerprint = %fingerprint,
                    age_ms = now.duration_since(entry.inserted_at).as_millis() as u64,
                    "Cache hit"
                );
                Ok(Some(Arc::clone(&entry.report)))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Insert or replace a report with its own time-to-live
    ///
    /// At capacity, expired entries are purged first; only then is the
    /// least-recently-used live entry evicted.
    pub async fn put(
        &self,
        fingerprint: RequestFingerprint,
        report: Arc<SynthesizedReport>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut store = self.reports.lock().await;
        store.ensure_open()?;
        let now = Instant::now();

        if !store.entries.contains(&fingerprint) && store.is_full() {
            let purged = purge_expired(&mut store.entries, now, |e| e.expires_at);
            self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        }

        let entry = ReportEntry {
            report,
            inserted_at: now,
            last_accessed_at: now,
            expires_at: instant_after(now, ttl),
        };

        if let Some((evicted, _)) = store.entries.push(fingerprint, entry) {
            if evicted != fingerprint {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %evicted, "Evicted least-recently-used report");
            }
        }
        Ok(())
    }

    /// Remove a report; returns whether one was present
    pub async fn invalidate(&self, fingerprint: &RequestFingerprint) -> Result<bool, CacheError> {
        let mut store = self.reports.lock().await;
        store.ensure_open()?;
        Ok(store.entries.pop(fingerprint).is_some())
    }

    /// Time since a report was last read or written, if cached
    pub async fn idle_time(
        &self,
        fingerprint: &RequestFingerprint,
    ) -> Result<Option<Duration>, CacheError> {
        let store = self.reports.lock().await;
        store.ensure_open()?;
        Ok(store
            .entries
            .peek(fingerprint)
            .map(|e| Instant::now().duration_since(e.last_accessed_at)))
    }

    // ========================================================================
    // Session contexts
    // ========================================================================

    /// Live context for a session, promoted to most-recently-used
    pub async fn get_context(
        &self,
        subject_id: &str,
        session_id: &str,
    ) -> Result<Option<SessionContext>, CacheError> {
        let mut store = self.contexts.lock().await;
        store.ensure_open()?;
        let key = (subject_id.to_string(), session_id.to_string());
        let now = Instant::now();

        let expired = match store.entries.peek(&key) {
            None => return Ok(None),
            Some(entry) => entry.expires_at <= now,
        };
        if expired {
            store.entries.pop(&key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        Ok(store.entries.get(&key).map(|e| e.context.clone()))
    }

    /// Store a whole context (e.g., loaded from the external store)
    pub async fn put_context(&self, mut context: SessionContext) -> Result<(), CacheError> {
        let mut store = self.contexts.lock().await;
        store.ensure_open()?;
        let now = Instant::now();

        let max = self.config.max_context_summaries;
        if context.summaries.len() > max {
            let excess = context.summaries.len() - max;
            context.summaries.drain(..excess);
        }

        let key = (context.subject_id.clone(), context.session_id.clone());
        self.insert_context(&mut store, key, context, now);
        Ok(())
    }

    /// Append a summary to a session's context, creating it if absent
    ///
    /// Keeps at most `max_context_summaries` entries (oldest dropped) and
    /// restarts the context's time-to-live. Returns the updated context.
    pub async fn append_context(
        &self,
        subject_id: &str,
        session_id: &str,
        summary: ReportSummary,
    ) -> Result<SessionContext, CacheError> {
        let mut store = self.contexts.lock().await;
        store.ensure_open()?;
        let key = (subject_id.to_string(), session_id.to_string());
        let now = Instant::now();

        let mut context = match store.entries.pop(&key) {
            Some(entry) if entry.expires_at > now => entry.context,
            Some(_) => {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                SessionContext::new(subject_id, session_id)
            }
            None => SessionContext::new(subject_id, session_id),
        };
        context.push_bounded(summary, self.config.max_context_summaries);

        self.insert_context(&mut store, key, context.clone(), now);
        Ok(context)
    }

    fn insert_context(
        &self,
        store: &mut Store<ContextKey, ContextEntry>,
        key: ContextKey,
        context: SessionContext,
        now: Instant,
    ) {
        if !store.entries.contains(&key) && store.is_full() {
            let purged = purge_expired(&mut store.entries, now, |e| e.expires_at);
            self.expirations.fetch_add(purged as u64, Ordering::Relaxed);
        }

        let entry = ContextEntry {
            context,
            expires_at: instant_after(now, self.config.context_ttl),
        };
        if let Some((evicted, _)) = store.entries.push(key.clone(), entry) {
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Remove every expired report and context; returns how many were removed
    pub async fn prune_expired(&self) -> Result<usize, CacheError> {
        let now = Instant::now();

        let reports = {
            let mut store = self.reports.lock().await;
            store.ensure_open()?;
            purge_expired(&mut store.entries, now, |e| e.expires_at)
        };
        let contexts = {
            let mut store = self.contexts.lock().await;
            store.ensure_open()?;
            purge_expired(&mut store.entries, now, |e| e.expires_at)
        };

        let removed = reports + contexts;
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            debug!(reports, contexts, "Pruned expired cache entries");
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> CacheStats {
        let reports = self.reports.lock().await.entries.len();
        let contexts = self.contexts.lock().await.entries.len();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            reports,
            contexts,
        }
    }

    pub async fn is_available(&self) -> bool {
        self.reports.lock().await.open
    }

    /// Flush both stores and refuse further operations
    pub async fn shutdown(&self) {
        let reports = {
            let mut store = self.reports.lock().await;
            store.open = false;
            let n = store.entries.len();
            store.entries.clear();
            n
        };
        let contexts = {
            let mut store = self.contexts.lock().await;
            store.open = false;
            let n = store.entries.len();
            store.entries.clear();
            n
        };
        info!(reports, contexts, "Session memory cache shut down");
    }
}

/// Remove entries whose expiry is at or before `now`
fn purge_expired<K, V>(
    entries: &mut LruCache<K, V>,
    now: Instant,
    expires_at: impl Fn(&V) -> Instant,
) -> usize
where
    K: std::hash::Hash + Eq + Clone,
{
    let expired: Vec<K> = entries
        .iter()
        .filter(|(_, v)| expires_at(v) <= now)
        .map(|(k, _)| k.clone())
        .collect();
    for key in &expired {
        entries.pop(key);
    }
    expired.len()
}
