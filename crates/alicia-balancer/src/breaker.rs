//! Per-instance circuit breaker: `closed -> open` after enough consecutive
//! failures, `open -> half_open` after `recovery_timeout`, `half_open ->
//! closed`/`open` on the probe outcome.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            failure_threshold,
            recovery_timeout,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Whether a request may be admitted right now. `open` transitions to
    /// `half_open` (and admits) once `recovery_timeout` has elapsed.
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                if self.opened_at.map(|t| t.elapsed() >= self.recovery_timeout).unwrap_or(false) {
                    self.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn on_success(&mut self) {
        self.consecutive_failures = 0;
        self.state = BreakerState::Closed;
        self.opened_at = None;
    }

    pub fn on_failure(&mut self) {
        match self.state {
            BreakerState::HalfOpen => self.trip(),
            BreakerState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    self.trip();
                }
            }
            BreakerState::Open => {}
        }
    }

    fn trip(&mut self) {
        self.state = BreakerState::Open;
        self.opened_at = Some(Instant::now());
        self.consecutive_failures = self.failure_threshold;
    }

    /// Force the breaker open regardless of the request-error counter —
    /// used when health-probe failures (a separate, lower threshold) trip
    /// it rather than request errors.
    pub fn force_open(&mut self) {
        self.trip();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_open_after_threshold_consecutive_failures() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.on_failure();
        breaker.on_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.on_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn open_denies_requests_until_recovery_timeout() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.on_failure();
        assert!(!breaker.allow_request());
        std::thread::sleep(Duration::from_millis(25));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_failure_reopens_and_resets_timer() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.on_failure();
        std::thread::sleep(Duration::from_millis(25));
        assert!(breaker.allow_request());
        breaker.on_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn half_open_success_closes_the_breaker() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(20));
        breaker.on_failure();
        std::thread::sleep(Duration::from_millis(25));
        assert!(breaker.allow_request());
        breaker.on_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
