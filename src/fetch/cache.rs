//! TTL request cache with in-flight de-duplication.
//!
//! All map mutations happen under one mutex and complete synchronously, so
//! no caller can observe a half-updated entry. The mutex is never held
//! across an await point.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::fetch::error::FetchError;
use crate::util::clock::{Clock, SystemClock};

/// Cache observability counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently stored.
    pub entries: usize,
    /// Fresh hits served without fetching.
    pub hits: u64,
    /// Misses, expiries, and forced refreshes that triggered or joined a
    /// fetch.
    pub misses: u64,
}

struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
}

type InflightResult<V> = Option<Result<V, FetchError>>;

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    inflight: HashMap<String, watch::Receiver<InflightResult<V>>>,
    hits: u64,
    misses: u64,
}

enum Plan<V> {
    Hit(V),
    Wait(watch::Receiver<InflightResult<V>>),
    Fetch(watch::Sender<InflightResult<V>>),
}

/// Removes the in-flight marker even when the owning fetch future is
/// dropped mid-flight (caller cancellation, coarse view timeout), so the
/// key cannot stay poisoned for later callers.
struct InflightGuard<'a, V: Clone> {
    cache: &'a RequestCache<V>,
    key: &'a str,
}

impl<V: Clone> Drop for InflightGuard<'_, V> {
    fn drop(&mut self) {
        self.cache.state.lock().inflight.remove(self.key);
    }
}

/// Keyed TTL cache that de-duplicates concurrent identical fetches.
///
/// The first caller for a missing/expired key issues the fetch; every
/// concurrent caller for the same key awaits that single pending result
/// instead of fetching again.
pub struct RequestCache<V: Clone> {
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> RequestCache<V> {
    /// Create a cache backed by the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache with an injected clock for deterministic tests.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                inflight: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Return the cached value for `key` if fresh, otherwise fetch it.
    ///
    /// A fresh hit with `force_refresh == false` returns the cached value
    /// without invoking `fetch_fn`. On miss, expiry, or forced refresh,
    /// `fetch_fn` runs exactly once per distinct in-flight key; a successful
    /// fetch always refreshes the entry's `fetched_at`, including when
    /// `force_refresh` bypassed a still-valid entry.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error, or [`FetchError::Cancelled`] when the
    /// caller that owned the in-flight fetch was dropped before resolving.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch_fn: F,
        force_refresh: bool,
    ) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>>,
    {
        let plan = {
            let mut state = self.state.lock();
            let fresh = !force_refresh
                && state.entries.get(key).is_some_and(|entry| {
                    self.clock.now().duration_since(entry.fetched_at) < ttl
                });
            if fresh {
                state.hits += 1;
                // Checked above; clone outside the closure keeps the borrow simple.
                let value = state
                    .entries
                    .get(key)
                    .map(|entry| entry.value.clone());
                match value {
                    Some(v) => Plan::Hit(v),
                    None => Self::plan_fetch_or_wait(&mut state, key),
                }
            } else {
                state.misses += 1;
                Self::plan_fetch_or_wait(&mut state, key)
            }
        };

        match plan {
            Plan::Hit(value) => Ok(value),
            Plan::Wait(mut rx) => loop {
                let settled = rx.borrow().clone();
                if let Some(result) = settled {
                    return result;
                }
                if rx.changed().await.is_err() {
                    return Err(FetchError::Cancelled);
                }
            },
            Plan::Fetch(tx) => {
                let guard = InflightGuard { cache: self, key };
                tracing::debug!(key, force_refresh, "cache miss, fetching");
                let result = fetch_fn().await;
                if let Ok(value) = &result {
                    self.state.lock().entries.insert(
                        key.to_string(),
                        CacheEntry {
                            value: value.clone(),
                            fetched_at: self.clock.now(),
                        },
                    );
                }
                drop(guard);
                let _ = tx.send(Some(result.clone()));
                result
            }
        }
    }

    fn plan_fetch_or_wait(state: &mut CacheState<V>, key: &str) -> Plan<V> {
        if let Some(rx) = state.inflight.get(key) {
            Plan::Wait(rx.clone())
        } else {
            let (tx, rx) = watch::channel(None);
            state.inflight.insert(key.to_string(), rx);
            Plan::Fetch(tx)
        }
    }

    /// Remove every cached entry. Hit/miss counters are preserved.
    pub fn clear_all(&self) {
        self.state.lock().entries.clear();
    }

    /// Entry count and hit/miss counters for observability.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
        }
    }
}

impl<V: Clone> Default for RequestCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
