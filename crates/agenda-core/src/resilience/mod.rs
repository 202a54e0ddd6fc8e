//! Resilience policies for outbound calls.
//!
//! This module provides:
//! - Retry logic with exponential backoff, jitter and per-attempt timeouts
//! - A sliding-window circuit breaker state machine
//! - `Resilience`, which combines both around one dependency

mod circuit_breaker;
mod policy;
mod retry;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
};
pub use policy::Resilience;
pub use retry::{retry_async, RetryConfig, RetryStats};
