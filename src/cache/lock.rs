use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Acquire the cache mutex, continuing with the inner state if a holder panicked.
pub(crate) fn lock_entries<'a, T>(lock: &'a Mutex<T>, op: &'static str) -> MutexGuard<'a, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        warn!(
            target = "docvault::cache",
            op,
            result = "poisoned_recovered",
            hint = "entries may be stale after a panic in another task",
            "Recovered from poisoned document cache lock"
        );
        poisoned.into_inner()
    })
}
