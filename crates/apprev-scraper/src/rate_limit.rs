//! Per-store request pacing and exponential backoff.
//!
//! Every outbound request to a marketplace goes through [`RateLimiter::acquire`],
//! which enforces the store's minimum spacing between requests and any backoff
//! window opened by earlier failures. [`retry_with_backoff`] drives the
//! acquire → request → record loop for a single logical request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use apprev_core::{AppConfig, Store};
use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;

/// Source of time for the limiter. Production code uses [`TokioClock`];
/// tests inject [`ManualClock`] to observe delays without waiting.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time via `tokio::time`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock: `sleep` returns immediately, advances virtual time and
/// records the requested duration.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Every non-zero sleep requested so far, in order.
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.elapsed) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *lock(&self.elapsed)
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            lock(&self.sleeps).push(duration);
            self.advance(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Pacing and retry policy for one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePolicy {
    /// Minimum spacing between consecutive requests.
    pub min_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Attempts per logical request, the first one included.
    pub max_attempts: u32,
    /// Scale each backoff delay by a random factor in `[0.75, 1.25)`.
    pub jitter: bool,
}

impl SourcePolicy {
    /// Built-in policy for `store`. The App Store feed throttles harder, so
    /// it gets twice the spacing.
    #[must_use]
    pub fn for_store(store: Store) -> Self {
        let min_interval = match store {
            Store::Android => Duration::from_secs(1),
            Store::Ios => Duration::from_secs(2),
        };
        Self {
            min_interval,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            max_attempts: 5,
            jitter: true,
        }
    }

    /// The un-jittered delay after `failures` consecutive failures.
    #[must_use]
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(20);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(self.backoff_max)
    }
}

/// Outcome of recording a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Try again once `delay` has elapsed. `attempt` counts failures so far.
    Retry { attempt: u32, delay: Duration },
    /// The attempt budget is spent; the state has been reset.
    Exhausted { attempts: u32 },
}

/// Snapshot of a store's backoff state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffState {
    pub consecutive_failures: u32,
    pub current_delay: Duration,
}

#[derive(Debug, Default)]
struct SourceState {
    last_request: Option<Instant>,
    not_before: Option<Instant>,
    failures: u32,
    current_delay: Duration,
}

impl SourceState {
    fn reset_backoff(&mut self) {
        self.failures = 0;
        self.current_delay = Duration::ZERO;
        self.not_before = None;
    }
}

/// Shared per-store pacing state. One instance is shared by every fetch in
/// the process so per-store ceilings hold across concurrent fetches.
pub struct RateLimiter {
    policies: HashMap<Store, SourcePolicy>,
    state: Mutex<HashMap<Store, SourceState>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Limiter with the built-in policy for every store and a Tokio clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            policies: Store::ALL
                .iter()
                .map(|&store| (store, SourcePolicy::for_store(store)))
                .collect(),
            state: Mutex::new(HashMap::new()),
            clock: Arc::new(TokioClock),
        }
    }

    /// Limiter configured from `APPREV_*` settings.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        let policy = |min_interval| SourcePolicy {
            min_interval,
            backoff_base: config.backoff_base(),
            backoff_max: config.backoff_max(),
            max_attempts: config.max_retries,
            jitter: true,
        };
        Self::new()
            .with_policy(Store::Android, policy(config.play_min_interval()))
            .with_policy(Store::Ios, policy(config.app_store_min_interval()))
    }

    #[must_use]
    pub fn with_policy(mut self, store: Store, policy: SourcePolicy) -> Self {
        self.policies.insert(store, policy);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn policy(&self, store: Store) -> SourcePolicy {
        self.policies
            .get(&store)
            .copied()
            .unwrap_or_else(|| SourcePolicy::for_store(store))
    }

    /// Wait until a request to `store` is permitted.
    ///
    /// The slot is reserved before sleeping, so concurrent callers for the
    /// same store queue up behind each other instead of firing together.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Cancelled`] if `cancel` fires first.
    pub async fn acquire(&self, store: Store, cancel: &CancellationToken) -> Result<(), ScraperError> {
        if cancel.is_cancelled() {
            return Err(ScraperError::Cancelled);
        }

        let wait = {
            let policy = self.policy(store);
            let now = self.clock.now();
            let mut states = lock(&self.state);
            let state = states.entry(store).or_default();

            let mut ready = now;
            if let Some(last) = state.last_request {
                ready = ready.max(last + policy.min_interval);
            }
            if let Some(not_before) = state.not_before {
                ready = ready.max(not_before);
            }
            state.last_request = Some(ready);
            ready.saturating_duration_since(now)
        };

        if wait.is_zero() {
            return Ok(());
        }

        tracing::debug!(
            %store,
            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
            "waiting for rate limit slot"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ScraperError::Cancelled),
            () = self.clock.sleep(wait) => Ok(()),
        }
    }

    /// Record a failed request and open a backoff window. The attempt count
    /// is the store's run of consecutive failures.
    pub fn record_failure(&self, store: Store) -> FailureOutcome {
        self.register_failure(store, None, None)
    }

    /// Like [`Self::record_failure`], but the delay is at least `floor`
    /// (still capped by the policy maximum). Used for `Retry-After` hints.
    pub fn record_failure_with_hint(&self, store: Store, floor: Duration) -> FailureOutcome {
        self.register_failure(store, None, Some(floor))
    }

    /// Record the `attempt`-th failure of one logical request.
    ///
    /// The attempt budget belongs to the request, so concurrent requests to
    /// the same store cannot spend or refill each other's budget. The backoff
    /// window is still shared: every request to `store` waits it out.
    pub fn record_request_failure(
        &self,
        store: Store,
        attempt: u32,
        floor: Option<Duration>,
    ) -> FailureOutcome {
        self.register_failure(store, Some(attempt), floor)
    }

    fn register_failure(
        &self,
        store: Store,
        request_attempt: Option<u32>,
        floor: Option<Duration>,
    ) -> FailureOutcome {
        let policy = self.policy(store);
        let now = self.clock.now();
        let mut states = lock(&self.state);
        let state = states.entry(store).or_default();

        state.failures = state.failures.saturating_add(1);
        let attempt = request_attempt.unwrap_or(state.failures);
        if attempt >= policy.max_attempts {
            // Any open window is left to expire for other requests.
            state.failures = 0;
            state.current_delay = Duration::ZERO;
            return FailureOutcome::Exhausted { attempts: attempt };
        }

        let mut delay = policy.backoff_delay(attempt);
        if policy.jitter {
            delay = delay.mul_f64(rand::random::<f64>() * 0.5 + 0.75);
        }
        if let Some(floor) = floor {
            delay = delay.max(floor);
        }
        let delay = delay.min(policy.backoff_max);

        let until = now + delay;
        state.current_delay = delay;
        state.not_before = Some(state.not_before.map_or(until, |not_before| not_before.max(until)));
        FailureOutcome::Retry { attempt, delay }
    }

    /// Reset `store` to its baseline after a successful request.
    pub fn record_success(&self, store: Store) {
        if let Some(state) = lock(&self.state).get_mut(&store) {
            state.reset_backoff();
        }
    }

    #[must_use]
    pub fn backoff_state(&self, store: Store) -> BackoffState {
        lock(&self.state)
            .get(&store)
            .map(|state| BackoffState {
                consecutive_failures: state.failures,
                current_delay: state.current_delay,
            })
            .unwrap_or_default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `operation` against `store` under the limiter, retrying transient
/// failures with exponential backoff.
///
/// Each attempt first waits for a rate-limit slot. Non-retriable errors are
/// returned as-is. Attempts are counted per call, so the budget holds even
/// while other requests to the same store succeed or fail concurrently. Once
/// it is spent the last error is wrapped in [`ScraperError::RetriesExhausted`].
///
/// # Errors
///
/// - [`ScraperError::Cancelled`] if `cancel` fires while waiting or in flight.
/// - [`ScraperError::RetriesExhausted`] after `max_attempts` retriable failures.
/// - Any non-retriable error from `operation`.
pub async fn retry_with_backoff<T, F, Fut>(
    limiter: &RateLimiter,
    store: Store,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut attempt: u32 = 0;
    loop {
        limiter.acquire(store, cancel).await?;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ScraperError::Cancelled),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => {
                limiter.record_success(store);
                return Ok(value);
            }
            Err(err) if !err.is_retriable() => return Err(err),
            Err(err) => err,
        };

        attempt += 1;
        let floor = match &err {
            ScraperError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        };

        match limiter.record_request_failure(store, attempt, floor) {
            FailureOutcome::Retry { attempt, delay } => {
                tracing::warn!(
                    %store,
                    attempt,
                    max_attempts = limiter.policy(store).max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "transient source error, retrying after backoff"
                );
            }
            FailureOutcome::Exhausted { attempts } => {
                tracing::error!(%store, attempts, error = %err, "retry budget exhausted");
                return Err(ScraperError::RetriesExhausted {
                    store,
                    attempts,
                    last: Box::new(err),
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
