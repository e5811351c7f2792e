//! TTL Cache (F, §4.6). A keyed store with per-entry insertion time, TTL
//! eviction on read, and access counters, safe under concurrent readers and
//! writers without any locking required of callers.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;

struct Entry<V> {
    value: Arc<V>,
    inserted_at: DateTime<Utc>,
    access_count: u64,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// A TTL-bounded cache keyed by `K`, storing values behind `Arc` so a `get`
/// never clones the payload itself. One `RwLock` guards the whole map;
/// readers never block each other, only a concurrent writer.
pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, Entry<V>>>,
    default_ttl: Duration,
    stats: RwLock<CacheStats>,
}

impl<K, V> TtlCache<K, V>
where
    K: std::hash::Hash + Eq + Clone,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self { entries: RwLock::new(HashMap::new()), default_ttl, stats: RwLock::new(CacheStats::default()) }
    }

    /// Stores `value`, stamping the current time as `inserted_at` and
    /// resetting `access_count` to zero.
    pub fn set(&self, key: K, value: V) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(key, Entry { value: Arc::new(value), inserted_at: Utc::now(), access_count: 0 });
        self.stats.write().expect("cache lock poisoned").entries = entries.len();
    }

    /// Returns the cached value if present and not expired under `ttl`
    /// (falling back to the cache's default TTL), incrementing its access
    /// counter. An expired entry is evicted and `None` is returned.
    pub fn get(&self, key: &K, ttl: Option<Duration>) -> Option<Arc<V>> {
        let ttl_effective = ttl.unwrap_or(self.default_ttl);
        let now = Utc::now();

        {
            let entries = self.entries.read().expect("cache lock poisoned");
            if let Some(entry) = entries.get(key) {
                let age = now.signed_duration_since(entry.inserted_at);
                if age.to_std().map(|age| age <= ttl_effective).unwrap_or(false) {
                    // Fall through to the write lock to bump access_count.
                } else {
                    drop(entries);
                    self.invalidate(key);
                    self.stats.write().expect("cache lock poisoned").misses += 1;
                    return None;
                }
            } else {
                self.stats.write().expect("cache lock poisoned").misses += 1;
                return None;
            }
        }

        let mut entries = self.entries.write().expect("cache lock poisoned");
        let value = entries.get_mut(key).map(|entry| {
            entry.access_count += 1;
            entry.value.clone()
        });
        if value.is_some() {
            self.stats.write().expect("cache lock poisoned").hits += 1;
        }
        value
    }

    /// Returns the entry's `inserted_at` without applying TTL eviction or
    /// bumping `access_count`/hit-miss stats — used by freshness reporting
    /// (§4.12), which needs a dataset's age even if it has already expired
    /// under the TTL an ordinary `get` would apply.
    pub fn inserted_at(&self, key: &K) -> Option<DateTime<Utc>> {
        self.entries.read().expect("cache lock poisoned").get(key).map(|entry| entry.inserted_at)
    }

    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        if entries.remove(key).is_some() {
            let mut stats = self.stats.write().expect("cache lock poisoned");
            stats.evictions += 1;
            stats.entries = entries.len();
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.clear();
        self.stats.write().expect("cache lock poisoned").entries = 0;
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.read().expect("cache lock poisoned")
    }
}
