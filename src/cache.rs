use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
#[cfg(test)]
use std::sync::Mutex;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ENTRIES: usize = 100;

// ---------------------------------------------------------------------------
// Clock: injectable time source
// ---------------------------------------------------------------------------

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *guard += chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// ResponseCache: TTL + LRU cache of raw API responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub captured_at: DateTime<Utc>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Shared cache of API responses keyed by request.
///
/// An entry is served while `now - captured_at < ttl`; older entries are
/// dropped when read. At `max_entries` (0 means unbounded) inserting a new
/// key evicts the least recently used entry.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<RwLock<CacheInner>>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    max_entries: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self::with_clock(ttl, max_entries, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner::default())),
            clock,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365)),
            max_entries,
        }
    }

    /// Read a fresh value. Expired entries are removed and reported as misses.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let fresh = match guard.entries.get(key) {
            Some(entry) => now - entry.captured_at < self.ttl,
            None => return None,
        };
        if !fresh {
            guard.entries.remove(key);
            return None;
        }
        let tick = guard.next_tick();
        let entry = guard.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: &str, value: Value) {
        let now = self.clock.now();
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if self.max_entries > 0
            && !guard.entries.contains_key(key)
            && guard.entries.len() >= self.max_entries
        {
            let ttl = self.ttl;
            guard.entries.retain(|_, e| now - e.captured_at < ttl);
            if guard.entries.len() >= self.max_entries {
                let oldest = guard
                    .entries
                    .values()
                    .min_by_key(|e| e.last_used)
                    .map(|e| e.key.clone());
                if let Some(oldest) = oldest {
                    tracing::debug!(key = %oldest, "cache_evicted");
                    guard.entries.remove(&oldest);
                }
            }
        }

        let tick = guard.next_tick();
        guard.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value,
                captured_at: now,
                last_used: tick,
            },
        );
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        guard.entries.clear();
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        guard.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 9, 15, 0).unwrap()))
    }

    #[test]
    fn test_cache_hit_within_ttl() {
        let clock = clock();
        let cache = ResponseCache::with_clock(Duration::from_secs(60), 10, clock.clone());
        cache.insert("live:a", json!({"v": 1}));
        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get("live:a"), Some(json!({"v": 1})));
    }

    #[test]
    fn test_cache_expires_at_ttl() {
        let clock = clock();
        let cache = ResponseCache::with_clock(Duration::from_secs(60), 10, clock.clone());
        cache.insert("live:a", json!(1));
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get("live:a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_miss() {
        let cache = ResponseCache::default();
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let clock = clock();
        let cache = ResponseCache::with_clock(Duration::from_secs(60), 2, clock.clone());
        cache.insert("a", json!(1));
        cache.insert("b", json!(2));
        assert!(cache.get("a").is_some());
        cache.insert("c", json!(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_cache_refresh_existing_key_does_not_evict() {
        let cache = ResponseCache::with_clock(Duration::from_secs(60), 2, clock());
        cache.insert("a", json!(1));
        cache.insert("b", json!(2));
        cache.insert("a", json!(10));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(json!(10)));
    }

    #[test]
    fn test_cache_clones_share_entries() {
        let cache = ResponseCache::default();
        let other = cache.clone();
        cache.insert("k", json!("v"));
        assert_eq!(other.get("k"), Some(json!("v")));
        other.clear();
        assert!(cache.is_empty());
    }
}
