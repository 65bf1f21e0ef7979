//! Circuit breaker for backend failure protection
//!
//! Prevents cascading failures when a model backend is down or rate
//! limited: after a threshold of consecutive failures the breaker opens
//! and the fallback chain skips straight to the next backend until the
//! cooldown elapses.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests allowed
    Closed,
    /// Too many failures - reject requests immediately
    Open,
    /// Cooldown elapsed - allow one request to test recovery
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Per-backend circuit breaker
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// `threshold` consecutive failures open the circuit for
    /// `cooldown_secs` seconds.
    pub fn new(threshold: u32, cooldown_secs: u64) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        let state = self.state.lock().expect("breaker mutex poisoned");

        if state.failure_count < self.threshold {
            return CircuitState::Closed;
        }

        match state.last_failure {
            Some(at) if at.elapsed() >= self.cooldown => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }

    /// Record a successful call (resets failure count)
    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        state.failure_count = 0;
        state.last_failure = None;
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("breaker mutex poisoned");
        state.failure_count += 1;
        state.last_failure = Some(Instant::now());
    }

    /// Whether a request may be attempted right now
    pub fn can_execute(&self) -> bool {
        !matches!(self.state(), CircuitState::Open)
    }

    /// Current failure count (for monitoring)
    pub fn failure_count(&self) -> u32 {
        self.state
            .lock()
            .expect("breaker mutex poisoned")
            .failure_count
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        // Conservative defaults: 3 failures, 60 second cooldown
        Self::new(3, 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_initial_state_closed() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new(3, 60);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn test_success_resets_failures() {
        let breaker = CircuitBreaker::new(3, 60);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.failure_count(), 2);

        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new(2, 1);

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        sleep(Duration::from_millis(1100));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.can_execute());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
