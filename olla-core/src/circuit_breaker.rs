//! # Circuit Breaker
//!
//! Per-endpoint failure isolation. Unlike a call-wrapping breaker, the proxy
//! engine needs to decide *before* dialling whether an endpoint should be
//! skipped, so this breaker exposes `allow_request`/`record_success`/
//! `record_failure` instead of a single `call()` combinator.
//!
//! State machine (spec): `Closed → Open` on `failure_threshold` consecutive
//! failures; `Open → HalfOpen` after `recovery_timeout` with no requests;
//! `HalfOpen → Closed` on `half_open_success_threshold` consecutive
//! successes; `HalfOpen → Open` on any failure.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Circuit breaker operational states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Tuning parameters for a `CircuitBreaker`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Time with no allowed requests before `Open` becomes eligible for
    /// `HalfOpen`.
    #[serde(with = "crate::common::duration_serde")]
    pub recovery_timeout: Duration,
    /// Maximum number of probe requests allowed while `HalfOpen`.
    pub half_open_max_calls: u32,
    /// Consecutive successes while `HalfOpen` required to close the
    /// circuit.
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
            half_open_success_threshold: 1,
        }
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    failure_count: u32,
    half_open_successes: u32,
    half_open_calls: u32,
    last_failure_time: Option<Instant>,
    last_success_time: Option<Instant>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            half_open_successes: 0,
            half_open_calls: 0,
            last_failure_time: None,
            last_success_time: None,
        }
    }
}

/// A single endpoint's circuit breaker. Cheap to clone (`Arc`-backed).
#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Arc<RwLock<State>>,
    endpoint: String,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(State::default())),
            endpoint: endpoint.into(),
        }
    }

    /// Whether a request should be dialled right now. Transitions
    /// `Open -> HalfOpen` when the recovery timeout has elapsed, and counts
    /// this call against `half_open_max_calls` when `HalfOpen`.
    pub async fn allow_request(&self) -> bool {
        let mut state = self.state.write().await;
        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = state
                    .last_failure_time
                    .map(|t| t.elapsed() >= self.config.recovery_timeout)
                    .unwrap_or(false);
                if elapsed {
                    state.state = CircuitState::HalfOpen;
                    state.half_open_calls = 0;
                    state.half_open_successes = 0;
                    tracing::info!(endpoint = %self.endpoint, "circuit breaker half-open");
                    state.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if state.half_open_calls < self.config.half_open_max_calls {
                    state.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        state.last_success_time = Some(Instant::now());
        match state.state {
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.half_open_success_threshold {
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.half_open_calls = 0;
                    state.half_open_successes = 0;
                    tracing::info!(endpoint = %self.endpoint, "circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.last_failure_time = Some(Instant::now());
        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    state.state = CircuitState::Open;
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        failures = state.failure_count,
                        "circuit breaker open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.half_open_calls = 0;
                state.half_open_successes = 0;
                tracing::warn!(endpoint = %self.endpoint, "circuit breaker re-opened");
            }
            CircuitState::Open => {}
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.state.read().await.state
    }

    pub async fn force_open(&self) {
        let mut state = self.state.write().await;
        state.state = CircuitState::Open;
        state.last_failure_time = Some(Instant::now());
    }

    pub async fn force_closed(&self) {
        let mut state = self.state.write().await;
        *state = State::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(failure_threshold: u32, recovery: Duration) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            recovery_timeout: recovery,
            half_open_max_calls: 2,
            half_open_success_threshold: 1,
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("a", cfg(2, Duration::from_secs(60)));
        assert_eq!(cb.state().await, CircuitState::Closed);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn open_blocks_dispatch_until_recovery() {
        let cb = CircuitBreaker::new("a", cfg(1, Duration::from_millis(50)));
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.allow_request().await);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cb.allow_request().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn half_open_closes_on_success_and_reopens_on_failure() {
        let cb = CircuitBreaker::new("a", cfg(1, Duration::from_millis(10)));
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(cb.allow_request().await);
        cb.record_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);

        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(cb.allow_request().await);
        cb.record_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn half_open_max_calls_bounds_probes() {
        let cb = CircuitBreaker::new("a", cfg(1, Duration::from_millis(10)));
        cb.record_failure().await;
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(cb.allow_request().await);
        assert!(cb.allow_request().await);
        assert!(!cb.allow_request().await);
    }
}
