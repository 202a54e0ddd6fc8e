//! Resilience wrapper combining retry and circuit breaking.
//!
//! A wrapped call first asks the breaker for permission, then runs the
//! operation under the retry policy. The whole retried call counts as one
//! outcome for the breaker. A call cancelled before it finishes records no
//! outcome.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
use super::retry::{retry_async, RetryConfig};
use crate::error::{AgendaError, Result};
use std::future::Future;
use tracing::debug;

/// Retry + circuit breaker around one dependency.
pub struct Resilience {
    breaker: CircuitBreaker,
    retry: RetryConfig,
}

impl Resilience {
    pub fn new(name: impl Into<String>, breaker: CircuitBreakerConfig, retry: RetryConfig) -> Self {
        Self {
            breaker: CircuitBreaker::with_config(name, breaker),
            retry,
        }
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    /// Run `operation` under the policy.
    ///
    /// Fails with `CircuitOpen` without invoking `operation` when the breaker
    /// refuses the call. Errors that show the dependency answered (not found,
    /// conflict, validation) count as successes for the breaker and are
    /// returned unchanged.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(permit) = self.breaker.try_acquire() else {
            debug!("Rejecting call to {}: circuit open", self.name());
            return Err(AgendaError::CircuitOpen {
                name: self.name().to_string(),
            });
        };

        // Held across the await: a cancelled call gives its probe slot back
        let (result, stats) = retry_async(&self.retry, operation).await;

        match &result {
            Err(e) if e.is_dependency_failure() => {
                debug!(
                    "Call to {} failed after {} attempts: {}",
                    self.name(),
                    stats.attempts,
                    e
                );
                permit.failure();
            }
            _ => permit.success(),
        }

        result
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    pub fn reset(&self) {
        self.breaker.reset()
    }
}
