//! Cache layer with transparent degradation.
//!
//! [`Cache`] wraps a [`CacheBackend`] and never surfaces backend errors:
//! the first failure flips an atomic `degraded` flag (logged once), after
//! which every operation is a no-op (`get → None`, `set → false`,
//! `delete → 0`) until a reconnect probe succeeds. Probes are attempted at
//! most once per `reconnect_interval`.
//!
//! Key layout:
//!
//! | Key | Value |
//! |-----|-------|
//! | `suggest:{scope}:{lang}:{prefix}` | JSON `Vec<Suggestion>` |
//! | `results:{sha256(query)[..16]}[:{fingerprint}]` | JSON search response |

use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bilingual_search_core::models::Language;

use crate::detached::DetachedWrites;

/// Raw key/value store behind the cache. Errors mean "unavailable".
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Check connectivity. Called when leaving degraded mode.
    async fn ping(&self) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<u64>;
    /// Delete every key matching a `*` glob. Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;
    /// Replace a sorted set.
    async fn set_scored(&self, key: &str, entries: &[(f64, String)], ttl: Duration) -> Result<()>;
    /// Highest-scoring `n` members, best first.
    async fn get_top_n(&self, key: &str, n: usize) -> Result<Vec<(f64, String)>>;
}

/// Degradation-aware cache facade. Construct once and share via `Arc`.
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    degraded: AtomicBool,
    last_probe: Mutex<Option<Instant>>,
    reconnect_interval: Duration,
    writes: DetachedWrites,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, reconnect_interval: Duration) -> Self {
        Self {
            backend,
            degraded: AtomicBool::new(false),
            last_probe: Mutex::new(None),
            reconnect_interval,
            writes: DetachedWrites::new(),
        }
    }

    /// Create and probe. An unreachable backend starts out degraded.
    pub async fn connect(backend: Arc<dyn CacheBackend>, reconnect_interval: Duration) -> Self {
        let cache = Self::new(backend, reconnect_interval);
        if let Err(e) = cache.backend.ping().await {
            cache.mark_degraded(&e);
        }
        cache
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn mark_degraded(&self, error: &anyhow::Error) {
        *self.last_probe.lock() = Some(Instant::now());
        if !self.degraded.swap(true, Ordering::AcqRel) {
            tracing::warn!(error = %error, "cache unavailable, continuing without cache");
        }
    }

    /// True when the backend may be used for this operation.
    async fn available(&self) -> bool {
        if !self.is_degraded() {
            return true;
        }

        {
            let mut last = self.last_probe.lock();
            if last.is_some_and(|t| t.elapsed() < self.reconnect_interval) {
                return false;
            }
            *last = Some(Instant::now());
        }

        match self.backend.ping().await {
            Ok(()) => {
                if self.degraded.swap(false, Ordering::AcqRel) {
                    tracing::info!("cache reconnected");
                }
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "cache reconnect failed");
                false
            }
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if !self.available().await {
            return None;
        }
        match self.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.mark_degraded(&e);
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        if !self.available().await {
            return false;
        }
        match self.backend.set(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.mark_degraded(&e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> u64 {
        if !self.available().await {
            return 0;
        }
        self.backend.delete(key).await.unwrap_or_else(|e| {
            self.mark_degraded(&e);
            0
        })
    }

    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        if !self.available().await {
            return 0;
        }
        match self.backend.delete_pattern(pattern).await {
            Ok(n) => {
                tracing::debug!(pattern, removed = n, "cache invalidated");
                n
            }
            Err(e) => {
                self.mark_degraded(&e);
                0
            }
        }
    }

    pub async fn set_scored(&self, key: &str, entries: &[(f64, String)], ttl: Duration) -> bool {
        if !self.available().await {
            return false;
        }
        match self.backend.set_scored(key, entries, ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.mark_degraded(&e);
                false
            }
        }
    }

    pub async fn get_top_n(&self, key: &str, n: usize) -> Vec<(f64, String)> {
        if !self.available().await {
            return Vec::new();
        }
        self.backend.get_top_n(key, n).await.unwrap_or_else(|e| {
            self.mark_degraded(&e);
            Vec::new()
        })
    }

    /// Typed read. Undecodable entries are treated as misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.set(key, &json, ttl).await,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to serialize cache value");
                false
            }
        }
    }

    /// Fire-and-forget write on the runtime. Serialization happens before
    /// returning so the caller keeps ownership of `value`.
    pub fn set_json_detached<T: Serialize>(self: &Arc<Self>, key: String, value: &T, ttl: Duration) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to serialize cache value");
                return;
            }
        };
        let cache = Arc::clone(self);
        self.writes.spawn(async move {
            cache.set(&key, &json, ttl).await;
        });
    }

    /// Wait for detached writes to land.
    pub async fn flush(&self) {
        self.writes.flush().await;
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.pending()
    }
}

/// `suggest:{scope}:{lang}:{prefix}`. `lang` is `all` when unspecified.
pub fn suggestion_key(scope: &str, language: Option<Language>, prefix: &str) -> String {
    let lang = language.map(|l| l.as_str()).unwrap_or("all");
    format!("suggest:{}:{}:{}", scope, lang, prefix)
}

/// `results:{sha256(query)[..16]}[:{fingerprint}]`.
pub fn results_key(query: &str, fingerprint: Option<&str>) -> String {
    let digest = hex::encode(Sha256::digest(query.as_bytes()));
    match fingerprint {
        Some(f) if !f.is_empty() => format!("results:{}:{}", &digest[..16], f),
        _ => format!("results:{}", &digest[..16]),
    }
}

// ============ In-process backend ============

enum Stored {
    Text(String),
    Scored(Vec<(f64, String)>),
}

struct Entry {
    value: Stored,
    expires_at: Instant,
}

/// Process-local [`CacheBackend`] with TTL expiry.
///
/// `set_available(false)` makes every call fail, which is how tests
/// simulate an outage.
pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, Entry>>,
    available: AtomicBool,
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<()> {
        if !self.available.load(Ordering::Acquire) {
            bail!("cache backend unavailable");
        }
        Ok(())
    }

    fn insert(&self, key: &str, value: Stored, ttl: Duration) {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// `*` matches any run of characters; everything else is literal.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let mut entries = self.entries.lock();
        if entries
            .get(key)
            .is_some_and(|e| e.expires_at <= Instant::now())
        {
            entries.remove(key);
            return Ok(None);
        }
        match entries.get(key) {
            Some(Entry {
                value: Stored::Text(s),
                ..
            }) => Ok(Some(s.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        self.insert(key, Stored::Text(value.to_string()), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64> {
        self.check()?;
        Ok(self.entries.lock().remove(key).map_or(0, |_| 1))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        self.check()?;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|k, _| !glob_match(pattern, k));
        Ok((before - entries.len()) as u64)
    }

    async fn set_scored(&self, key: &str, entries: &[(f64, String)], ttl: Duration) -> Result<()> {
        self.check()?;
        let mut sorted = entries.to_vec();
        sorted.sort_by(|a, b| b.0.total_cmp(&a.0));
        self.insert(key, Stored::Scored(sorted), ttl);
        Ok(())
    }

    async fn get_top_n(&self, key: &str, n: usize) -> Result<Vec<(f64, String)>> {
        self.check()?;
        let entries = self.entries.lock();
        match entries.get(key) {
            Some(Entry {
                value: Stored::Scored(members),
                expires_at,
            }) if *expires_at > Instant::now() => Ok(members.iter().take(n).cloned().collect()),
            _ => Ok(Vec::new()),
        }
    }
}
