//! Best-effort coordination with a shared token store.
//!
//! Multi-node deployments can point several engines at one store so a budget
//! is spent jointly. The store is advisory: it may be slow, stale or down,
//! and the engine treats every failure as "enforce locally" rather than an
//! admission error. Network-backed providers (a revisioned KV store, a
//! message-bus counter service) live outside this crate; [`CounterStore`] is
//! the in-process reference implementation used by tests and by
//! multi-engine setups inside one process.

use std::collections::HashMap;
use std::error::Error;
use std::sync::Mutex;

/// Boxed error for store operations, the same service-boundary error shape
/// used across the Tower ecosystem.
pub type StoreError = Box<dyn Error + Send + Sync>;

/// A shared token counter keyed by distributed key.
///
/// `try_acquire` runs on the admission path and may block on I/O; the other
/// two run after a refill and are fire-and-forget from the engine's point of
/// view. Implementations do not need to be exact under contention — the
/// engine's local buckets remain the backstop.
pub trait DistributedStore: Send + Sync {
    /// Take one token for `key`, seeding the counter at `max_tokens` if the
    /// key is new. Returns whether a token was granted.
    fn try_acquire(&self, key: &str, max_tokens: i64) -> Result<bool, StoreError>;

    /// Return `tokens` to the shared counter.
    fn release(&self, key: &str, tokens: i64) -> Result<(), StoreError>;

    /// Overwrite the shared counter with `max_tokens` (fixed-window refill).
    fn reset(&self, key: &str, max_tokens: i64) -> Result<(), StoreError>;
}

/// In-memory [`DistributedStore`] backed by a mutexed counter map.
#[derive(Debug, Default)]
pub struct CounterStore {
    counters: Mutex<HashMap<String, i64>>,
}

impl CounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter value, if the key has been seen.
    pub fn remaining(&self, key: &str) -> Option<i64> {
        self.lock().get(key).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, i64>> {
        // A poisoned counter map only means a panicking thread mid-update;
        // the counters themselves are still well-formed integers.
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DistributedStore for CounterStore {
    fn try_acquire(&self, key: &str, max_tokens: i64) -> Result<bool, StoreError> {
        let mut counters = self.lock();
        let counter = counters.entry(key.to_owned()).or_insert(max_tokens);
        if *counter > 0 {
            *counter -= 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn release(&self, key: &str, tokens: i64) -> Result<(), StoreError> {
        let mut counters = self.lock();
        *counters.entry(key.to_owned()).or_insert(0) += tokens;
        Ok(())
    }

    fn reset(&self, key: &str, max_tokens: i64) -> Result<(), StoreError> {
        self.lock().insert(key.to_owned(), max_tokens);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_acquire_seeds_the_counter() {
        let store = CounterStore::new();
        assert!(store.try_acquire("k", 3).unwrap());
        assert_eq!(store.remaining("k"), Some(2));
    }

    #[test]
    fn acquire_fails_when_drained() {
        let store = CounterStore::new();
        for _ in 0..3 {
            assert!(store.try_acquire("k", 3).unwrap());
        }
        assert!(!store.try_acquire("k", 3).unwrap());
        assert_eq!(store.remaining("k"), Some(0));
    }

    #[test]
    fn release_returns_tokens() {
        let store = CounterStore::new();
        assert!(store.try_acquire("k", 1).unwrap());
        assert!(!store.try_acquire("k", 1).unwrap());

        store.release("k", 1).unwrap();
        assert!(store.try_acquire("k", 1).unwrap());
    }

    #[test]
    fn reset_overwrites_the_counter() {
        let store = CounterStore::new();
        for _ in 0..5 {
            let _ = store.try_acquire("k", 5).unwrap();
        }
        store.reset("k", 5).unwrap();
        assert_eq!(store.remaining("k"), Some(5));
    }

    #[test]
    fn keys_are_independent() {
        let store = CounterStore::new();
        assert!(store.try_acquire("a", 1).unwrap());
        assert!(store.try_acquire("b", 1).unwrap());
        assert!(!store.try_acquire("a", 1).unwrap());
    }
}
