//! Circuit breaker for collaborator calls.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-open: exactly one probe tests recovery
//!
//! # State transitions
//! ```text
//! Closed → Open: failure count reaches threshold within the sliding window
//! Open → Half-open: after the cooldown elapses
//! Half-open → Closed: probe succeeds (failure counter reset)
//! Half-open → Open: probe fails (fresh opened_at, cooldown doubled)
//! ```
//!
//! One breaker per logical dependency, so a slow query type cannot starve
//! unrelated queries. The cooldown backs off exponentially on consecutive
//! reopens, capped at `max_cooldown`, and resets once the breaker closes.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::fetch::error::FetchError;
use crate::util::clock::{Clock, SystemClock};

/// Breaker tuning knobs.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failures within `window` that trip the breaker.
    pub failure_threshold: usize,
    /// Sliding window over which failures are counted.
    pub window: Duration,
    /// Cooldown before the first recovery probe.
    pub cooldown: Duration,
    /// Upper bound for the exponentially backed-off cooldown.
    pub max_cooldown: Duration,
    /// Per-call timeout; exceeding it counts as a failure.
    pub call_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(300),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through; failures are counted.
    Closed,
    /// Calls are rejected without being issued.
    Open,
    /// A single recovery probe is allowed through.
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    consecutive_opens: u32,
    probe_in_flight: bool,
}

/// Per-dependency circuit breaker wrapping outbound calls with a timeout
/// and fail-fast rejection while the dependency is considered down.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker for the named logical dependency.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Create a breaker with an injected clock for deterministic tests.
    #[must_use]
    pub fn with_clock(name: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                consecutive_opens: 0,
                probe_in_flight: false,
            }),
        }
    }

    /// Current state without side effects. An elapsed cooldown is only
    /// acted upon when the next call is admitted.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Run `fetch_fn` under the breaker with the configured per-call
    /// timeout.
    ///
    /// # Errors
    ///
    /// [`FetchError::BreakerOpen`] when the call is rejected without being
    /// issued, [`FetchError::Timeout`] when the call exceeds the timeout,
    /// or the error returned by the call itself. Cancellation is passed
    /// through without counting as a failure.
    pub async fn call<T, F, Fut>(&self, fetch_fn: F) -> Result<T, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.admit()?;
        match tokio::time::timeout(self.config.call_timeout, fetch_fn()).await {
            Ok(Ok(value)) => {
                self.record_success();
                Ok(value)
            }
            Ok(Err(FetchError::Cancelled)) => {
                self.release_probe();
                Err(FetchError::Cancelled)
            }
            Ok(Err(err)) => {
                self.record_failure();
                Err(err)
            }
            Err(_) => {
                self.record_failure();
                Err(FetchError::Timeout(self.config.call_timeout))
            }
        }
    }

    fn cooldown_for(&self, consecutive_opens: u32) -> Duration {
        let doublings = consecutive_opens.saturating_sub(1).min(16);
        let backed_off = self
            .config
            .cooldown
            .saturating_mul(2_u32.saturating_pow(doublings));
        backed_off.min(self.config.max_cooldown)
    }

    fn admit(&self) -> Result<(), FetchError> {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let now = self.clock.now();
                let opened_at = inner.opened_at.unwrap_or(now);
                let cooldown = self.cooldown_for(inner.consecutive_opens);
                let elapsed = now.duration_since(opened_at);
                if elapsed >= cooldown {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!(breaker = %self.name, "cooldown elapsed, admitting recovery probe");
                    Ok(())
                } else {
                    Err(FetchError::BreakerOpen {
                        retry_after: cooldown - elapsed,
                    })
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(FetchError::BreakerOpen {
                        retry_after: Duration::ZERO,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            tracing::info!(breaker = %self.name, "recovery probe succeeded, closing breaker");
        }
        inner.state = BreakerState::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.consecutive_opens = 0;
        inner.probe_in_flight = false;
    }

    fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.consecutive_opens = inner.consecutive_opens.saturating_add(1);
                Self::trip(&mut inner, now);
                tracing::warn!(
                    breaker = %self.name,
                    consecutive_opens = inner.consecutive_opens,
                    "recovery probe failed, reopening breaker"
                );
            }
            BreakerState::Closed => {
                inner.failures.push_back(now);
                let window = self.config.window;
                while inner
                    .failures
                    .front()
                    .is_some_and(|first| now.duration_since(*first) > window)
                {
                    inner.failures.pop_front();
                }
                if inner.failures.len() >= self.config.failure_threshold {
                    inner.consecutive_opens = 1;
                    Self::trip(&mut inner, now);
                    tracing::warn!(
                        breaker = %self.name,
                        threshold = self.config.failure_threshold,
                        "failure threshold reached, opening breaker"
                    );
                }
            }
            // A call admitted before the trip may still report its failure.
            BreakerState::Open => {}
        }
    }

    fn release_probe(&self) {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::HalfOpen {
            inner.probe_in_flight = false;
        }
    }

    fn trip(inner: &mut BreakerInner, now: Instant) {
        inner.state = BreakerState::Open;
        inner.opened_at = Some(now);
        inner.failures.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(120),
            call_timeout: Duration::from_millis(50),
        }
    }

    fn breaker(clock: Arc<ManualClock>) -> CircuitBreaker {
        CircuitBreaker::with_clock("test", config(), clock)
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker
            .call::<u32, _, _>(|| async { Err(FetchError::Transport("down".into())) })
            .await;
    }

    #[tokio::test]
    async fn test_opens_after_threshold_and_rejects_without_calling() {
        let clock = Arc::new(ManualClock::new());
        let b = breaker(clock);
        for _ in 0..3 {
            fail(&b).await;
        }
        assert_eq!(b.state(), BreakerState::Open);

        let calls = AtomicUsize::new(0);
        let err = b
            .call::<u32, _, _>(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(1) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::BreakerOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_half_open_probe_success_closes() {
        let clock = Arc::new(ManualClock::new());
        let b = breaker(clock.clone());
        for _ in 0..3 {
            fail(&b).await;
        }
        clock.advance(Duration::from_secs(30));
        let value = b.call::<u32, _, _>(|| async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_probe_failure_reopens_with_backoff() {
        let clock = Arc::new(ManualClock::new());
        let b = breaker(clock.clone());
        for _ in 0..3 {
            fail(&b).await;
        }
        clock.advance(Duration::from_secs(30));
        fail(&b).await;
        assert_eq!(b.state(), BreakerState::Open);

        // The reopened cooldown has doubled: 30s is no longer enough.
        clock.advance(Duration::from_secs(30));
        let err = b.call::<u32, _, _>(|| async { Ok(1) }).await.unwrap_err();
        assert!(matches!(err, FetchError::BreakerOpen { .. }));

        clock.advance(Duration::from_secs(30));
        let value = b.call::<u32, _, _>(|| async { Ok(9) }).await.unwrap();
        assert_eq!(value, 9);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let clock = Arc::new(ManualClock::new());
        let b = breaker(clock);
        for _ in 0..3 {
            let err = b
                .call::<u32, _, _>(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(1)
                })
                .await
                .unwrap_err();
            assert_eq!(err, FetchError::Timeout(Duration::from_millis(50)));
        }
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_window_prunes_old_failures() {
        let clock = Arc::new(ManualClock::new());
        let b = breaker(clock.clone());
        fail(&b).await;
        fail(&b).await;
        clock.advance(Duration::from_secs(61));
        fail(&b).await;
        // Two of the three failures fell out of the window.
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_a_failure() {
        let clock = Arc::new(ManualClock::new());
        let b = breaker(clock);
        for _ in 0..5 {
            let err = b
                .call::<u32, _, _>(|| async { Err(FetchError::Cancelled) })
                .await
                .unwrap_err();
            assert_eq!(err, FetchError::Cancelled);
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_cooldown_backoff_is_capped() {
        let clock = Arc::new(ManualClock::new());
        let b = breaker(clock.clone());
        for _ in 0..3 {
            fail(&b).await;
        }
        // Fail four probes in a row; backoff would be 480s uncapped.
        for _ in 0..4 {
            clock.advance(Duration::from_secs(480));
            fail(&b).await;
        }
        clock.advance(Duration::from_secs(120));
        let value = b.call::<u32, _, _>(|| async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
    }
}
