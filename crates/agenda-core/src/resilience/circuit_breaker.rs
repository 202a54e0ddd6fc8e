//! Circuit breaker for outbound store and upstream calls.
//!
//! An explicit state machine:
//! - CLOSED: calls flow through; outcomes fill a count-based sliding window.
//!   The circuit opens once the window holds at least `minimum_calls`
//!   outcomes and the failure rate reaches `failure_rate_threshold`.
//! - OPEN: calls are rejected without being attempted. After `open_timeout`
//!   the next permission check moves the circuit to HALF_OPEN.
//! - HALF_OPEN: up to `half_open_max_calls` probes are let through. One probe
//!   failure reopens the circuit; all probes succeeding closes it.
//!
//! All mutable state sits behind one mutex so threshold evaluation and the
//! transition it triggers happen atomically.

use crate::config::ResilienceDefaults;
use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - calls flow through.
    Closed,
    /// Failing - calls are rejected immediately.
    Open,
    /// Probing recovery - a limited number of calls allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

impl Serialize for CircuitState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of most recent outcomes considered.
    pub sliding_window_size: u32,
    /// Outcomes required before the failure rate is evaluated.
    pub minimum_calls: u32,
    /// Failure rate in percent (1..=100) that opens the circuit.
    pub failure_rate_threshold: u8,
    /// How long the circuit stays open before probing.
    pub open_timeout: Duration,
    /// Probes permitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            sliding_window_size: ResilienceDefaults::SLIDING_WINDOW_SIZE,
            minimum_calls: ResilienceDefaults::MINIMUM_CALLS,
            failure_rate_threshold: ResilienceDefaults::FAILURE_RATE_THRESHOLD,
            open_timeout: ResilienceDefaults::OPEN_TIMEOUT,
            half_open_max_calls: ResilienceDefaults::HALF_OPEN_MAX_CALLS,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// `true` marks a failure.
    window: VecDeque<bool>,
    consecutive_failures: u32,
    state_since: Instant,
    half_open_permitted: u32,
    half_open_succeeded: u32,
    /// Bumped on every state change.
    generation: u64,
}

impl Inner {
    fn failures(&self) -> usize {
        self.window.iter().filter(|failed| **failed).count()
    }

    fn failure_rate(&self) -> f32 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.failures() as f32 * 100.0 / self.window.len() as f32
    }
}

/// Circuit breaker protecting one dependency.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    total_failures: AtomicU64,
    total_successes: AtomicU64,
    total_rejected: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom configuration.
    pub fn with_config(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let capacity = config.sliding_window_size.max(1) as usize;
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(capacity),
                consecutive_failures: 0,
                state_since: Instant::now(),
                half_open_permitted: 0,
                half_open_succeeded: 0,
                generation: 0,
            }),
            total_failures: AtomicU64::new(0),
            total_successes: AtomicU64::new(0),
            total_rejected: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Get the current state, applying a due OPEN -> HALF_OPEN transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    /// Ask permission for one call.
    ///
    /// Returns `false` while open or when half-open probes are used up; the
    /// caller must then fail fast without attempting the call. Outcomes are
    /// reported separately through `record_success`/`record_failure`.
    pub fn allow_request(&self) -> bool {
        self.admit().is_some()
    }

    /// Ask permission for one call and get a permit for its outcome.
    ///
    /// The permit remembers the circuit generation it was issued in, so an
    /// outcome arriving after the circuit changed state is discarded. A
    /// permit dropped without an outcome hands its half-open probe slot back.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        self.admit().map(|admission| CallPermit {
            breaker: self,
            admission,
            settled: false,
        })
    }

    fn admit(&self) -> Option<Admission> {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);

        let state = inner.state;
        let allowed = match state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.half_open_permitted < self.config.half_open_max_calls {
                    inner.half_open_permitted += 1;
                    true
                } else {
                    false
                }
            }
        };

        if !allowed {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        Some(Admission {
            state,
            generation: inner.generation,
        })
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        self.on_success(&mut inner);
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.lock();
        self.on_failure(&mut inner);
    }

    fn settle(&self, admission: Admission, failed: bool) {
        let counter = if failed {
            &self.total_failures
        } else {
            &self.total_successes
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.lock();
        if inner.generation != admission.generation {
            debug!(
                "Discarding outcome of a call admitted while {} for {}",
                admission.state, self.name
            );
            return;
        }
        if failed {
            self.on_failure(&mut inner);
        } else {
            self.on_success(&mut inner);
        }
    }

    fn release(&self, admission: Admission) {
        if admission.state != CircuitState::HalfOpen {
            return;
        }
        let mut inner = self.lock();
        if inner.generation == admission.generation {
            inner.half_open_permitted = inner.half_open_permitted.saturating_sub(1);
            debug!("Half-open probe for {} abandoned, slot released", self.name);
        }
    }

    fn on_success(&self, inner: &mut Inner) {
        inner.consecutive_failures = 0;

        let state = inner.state;
        match state {
            CircuitState::Closed => self.push_outcome(inner, false),
            CircuitState::HalfOpen => {
                inner.half_open_succeeded += 1;
                if inner.half_open_succeeded >= self.config.half_open_max_calls {
                    self.transition(inner, CircuitState::Closed);
                }
            }
            // Late result of a call admitted before the circuit opened
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut Inner) {
        inner.consecutive_failures += 1;

        let state = inner.state;
        match state {
            CircuitState::Closed => {
                self.push_outcome(inner, true);
                let required = self.config.minimum_calls.min(self.config.sliding_window_size);
                if inner.window.len() >= required.max(1) as usize
                    && inner.failure_rate() >= f32::from(self.config.failure_rate_threshold)
                {
                    self.transition(inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition(inner, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    /// Get statistics about this circuit breaker.
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut inner = self.lock();
        self.maybe_half_open(&mut inner);
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_rate: inner.failure_rate(),
            window_calls: inner.window.len(),
            consecutive_failures: inner.consecutive_failures,
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            time_in_state_ms: inner.state_since.elapsed().as_millis() as u64,
        }
    }

    /// Force the circuit back to CLOSED with an empty window.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.window.clear();
        inner.consecutive_failures = 0;
        inner.half_open_permitted = 0;
        inner.half_open_succeeded = 0;
        inner.generation += 1;
        inner.state_since = Instant::now();
        info!("Circuit breaker for {} reset to CLOSED", self.name);
    }

    fn push_outcome(&self, inner: &mut Inner, failed: bool) {
        if inner.window.len() >= self.config.sliding_window_size.max(1) as usize {
            inner.window.pop_front();
        }
        inner.window.push_back(failed);
    }

    fn maybe_half_open(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open
            && inner.state_since.elapsed() >= self.config.open_timeout
        {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    /// The only place state changes. Transitions not in the table are ignored.
    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        use CircuitState::*;

        let from = inner.state;
        let allowed = matches!(
            (from, to),
            (Closed, Open) | (Open, HalfOpen) | (HalfOpen, Closed) | (HalfOpen, Open)
        );
        if !allowed {
            debug!(
                "Ignoring circuit transition {} -> {} for {}",
                from, to, self.name
            );
            return;
        }

        match to {
            Open => warn!(
                "Circuit breaker for {} opened ({} -> OPEN, failure rate {:.0}%, {} consecutive failures)",
                self.name,
                from,
                inner.failure_rate(),
                inner.consecutive_failures
            ),
            HalfOpen => debug!("Circuit breaker for {} entering HALF_OPEN", self.name),
            Closed => info!("Circuit breaker for {} recovered to CLOSED", self.name),
        }

        inner.state = to;
        inner.generation += 1;
        inner.state_since = Instant::now();
        inner.half_open_permitted = 0;
        inner.half_open_succeeded = 0;
        if to == Closed {
            inner.window.clear();
            inner.consecutive_failures = 0;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Admission {
    state: CircuitState,
    generation: u64,
}

/// Permission for one call, obtained from [`CircuitBreaker::try_acquire`].
///
/// Report the outcome with [`CallPermit::success`] or [`CallPermit::failure`].
/// Dropping it unreported (the call was cancelled) records nothing.
#[must_use = "dropping a permit abandons the call"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl CallPermit<'_> {
    /// State the circuit was in when the call was admitted.
    pub fn admitted_in(&self) -> CircuitState {
        self.admission.state
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.settle(self.admission, false);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.settle(self.admission, true);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.release(self.admission);
        }
    }
}

/// Statistics about a circuit breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    /// Failure rate of the current window, in percent.
    pub failure_rate: f32,
    pub window_calls: usize,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_rejected: u64,
    pub time_in_state_ms: u64,
}
