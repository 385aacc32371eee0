//! Data consistency manager: cache + breaker + invariant validation.
//!
//! Composes the request cache and a per-dependency circuit breaker, then
//! validates every fetched batch against caller-supplied rules before it
//! may reach application state. A validation failure is distinct from a
//! transport failure: the fetch succeeded, but the records are withheld.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::fetch::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::fetch::cache::{CacheStats, RequestCache};
use crate::fetch::error::FetchError;
use crate::util::clock::Clock;

/// Named predicate over a single record. A batch is valid only if every
/// record satisfies every rule; rules compose by simple conjunction.
pub struct ValidationRule<T> {
    name: String,
    check: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> ValidationRule<T> {
    /// Create a rule from a name and a predicate.
    pub fn new(name: impl Into<String>, check: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Rule name, used in violation reports.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the predicate to one record.
    #[must_use]
    pub fn check(&self, record: &T) -> bool {
        (self.check)(record)
    }
}

impl<T> Clone for ValidationRule<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            check: Arc::clone(&self.check),
        }
    }
}

impl<T> fmt::Debug for ValidationRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Outcome of a validated fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBatch<T> {
    /// Records admitted to application state; empty when `is_valid` is
    /// false.
    pub records: Vec<T>,
    /// True when every record passed every rule.
    pub is_valid: bool,
    /// One entry per violated (rule, record) pair.
    pub errors: Vec<String>,
}

/// Composes [`RequestCache`] and [`CircuitBreaker`] for one logical
/// dependency and gates fetched batches behind validation rules.
pub struct DataConsistencyManager<T: Clone> {
    cache: RequestCache<Vec<T>>,
    breaker: CircuitBreaker,
}

impl<T: Clone> DataConsistencyManager<T> {
    /// Create a manager for the named logical dependency.
    #[must_use]
    pub fn new(name: impl Into<String>, breaker_config: BreakerConfig) -> Self {
        Self {
            cache: RequestCache::new(),
            breaker: CircuitBreaker::new(name, breaker_config),
        }
    }

    /// Create a manager sharing one injected clock across cache and
    /// breaker, for deterministic tests.
    #[must_use]
    pub fn with_clock(
        name: impl Into<String>,
        breaker_config: BreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: RequestCache::with_clock(Arc::clone(&clock)),
            breaker: CircuitBreaker::with_clock(name, breaker_config, clock),
        }
    }

    /// Fetch (through cache and breaker) and validate a batch of records.
    ///
    /// The raw batch is cached regardless of validity so it stays available
    /// for diagnostics; on validation failure the returned batch carries
    /// `is_valid == false`, the violations, and no records.
    ///
    /// # Errors
    ///
    /// Transport-level failures only ([`FetchError`]); validation failures
    /// are reported as data, not errors.
    pub async fn fetch_validated<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch_fn: F,
        rules: &[ValidationRule<T>],
        force_refresh: bool,
    ) -> Result<ValidatedBatch<T>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>, FetchError>>,
    {
        let breaker = &self.breaker;
        let records = self
            .cache
            .get_or_fetch(key, ttl, || breaker.call(fetch_fn), force_refresh)
            .await?;
        let errors = violations(&records, rules);
        if errors.is_empty() {
            Ok(ValidatedBatch {
                records,
                is_valid: true,
                errors,
            })
        } else {
            tracing::warn!(
                key,
                violations = errors.len(),
                "batch failed consistency validation, withholding records"
            );
            Ok(ValidatedBatch {
                records: Vec::new(),
                is_valid: false,
                errors,
            })
        }
    }

    /// Evict every cached entry for this dependency.
    pub fn clear_all(&self) {
        self.cache.clear_all();
    }

    /// Cache statistics for operational visibility.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Current breaker state for operational visibility.
    #[must_use]
    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }
}

fn violations<T>(records: &[T], rules: &[ValidationRule<T>]) -> Vec<String> {
    let mut errors = Vec::new();
    for (index, record) in records.iter().enumerate() {
        for rule in rules {
            if !rule.check(record) {
                errors.push(format!("record {index} violates rule `{}`", rule.name()));
            }
        }
    }
    errors
}
