//! Document metadata cache.
//!
//! Entries expire a fixed TTL after they were last written and are dropped lazily on the
//! first read past that point. Capacity is bounded with LRU eviction. Blob bytes are never
//! cached, only metadata.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;
use tracing::trace;

use crate::domain::documents::DocumentRecord;

use super::config::CacheConfig;
use super::lock::lock_entries;

pub const METRIC_CACHE_HIT: &str = "docvault_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "docvault_cache_miss_total";
pub const METRIC_CACHE_EXPIRED: &str = "docvault_cache_expired_total";
pub const METRIC_CACHE_EVICT: &str = "docvault_cache_evict_total";

/// Key/value contract the document service relies on.
///
/// Implementations must be linearizable per key under concurrent use.
pub trait DocumentCache: Send + Sync {
    fn get(&self, key: &str) -> Option<DocumentRecord>;

    /// Insert or replace, restarting the entry's TTL.
    fn set(&self, key: String, document: DocumentRecord);

    fn delete(&self, key: &str);
}

/// Monotonic time source, injectable so expiry can be tested deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock_entries(&self.elapsed, "manual_clock.advance") += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *lock_entries(&self.elapsed, "manual_clock.now")
    }
}

struct CacheEntry {
    document: DocumentRecord,
    expires_at: Instant,
}

pub struct TtlDocumentCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TtlDocumentCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.max_entries_non_zero())),
            ttl: config.ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of resident entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        lock_entries(&self.entries, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is resident, without touching recency or expiry.
    pub fn contains(&self, key: &str) -> bool {
        lock_entries(&self.entries, "contains").contains(key)
    }

    pub fn clear(&self) {
        lock_entries(&self.entries, "clear").clear();
    }
}

impl DocumentCache for TtlDocumentCache {
    fn get(&self, key: &str) -> Option<DocumentRecord> {
        let now = self.clock.now();
        let mut entries = lock_entries(&self.entries, "get");

        let expired = match entries.get(key) {
            Some(entry) if now < entry.expires_at => {
                counter!(METRIC_CACHE_HIT).increment(1);
                return Some(entry.document.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            counter!(METRIC_CACHE_EXPIRED).increment(1);
            trace!(target = "docvault::cache", key, "expired entry evicted on read");
        }
        counter!(METRIC_CACHE_MISS).increment(1);
        None
    }

    fn set(&self, key: String, document: DocumentRecord) {
        let expires_at = self.clock.now() + self.ttl;
        let mut entries = lock_entries(&self.entries, "set");
        let displaced = entries.push(
            key.clone(),
            CacheEntry {
                document,
                expires_at,
            },
        );

        if let Some((evicted_key, _)) = displaced {
            if evicted_key != key {
                counter!(METRIC_CACHE_EVICT).increment(1);
                trace!(
                    target = "docvault::cache",
                    key = %evicted_key,
                    "entry evicted by capacity"
                );
            }
        }
    }

    fn delete(&self, key: &str) {
        lock_entries(&self.entries, "delete").pop(key);
    }
}
