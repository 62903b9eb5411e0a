//! Document metadata cache.
//!
//! A process-local, TTL-bounded map from `document:<id>` keys to document metadata.
//! The document service is its only writer.
//!
//! ```toml
//! [cache]
//! ttl_seconds = 300
//! max_entries = 10000
//! ```

mod config;
mod keys;
mod lock;
mod store;

pub use config::CacheConfig;
pub use keys::{DOCUMENT_KEY_PREFIX, document_key};
pub use store::{
    Clock, DocumentCache, METRIC_CACHE_EVICT, METRIC_CACHE_EXPIRED, METRIC_CACHE_HIT,
    METRIC_CACHE_MISS, ManualClock, SystemClock, TtlDocumentCache,
};
