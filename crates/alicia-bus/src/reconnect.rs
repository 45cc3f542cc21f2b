//! Exponential backoff with full jitter for broker reconnection. Base 1s,
//! cap 60s, per spec §4.1.

use std::time::Duration;

use rand::Rng;

pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            attempt: 0,
        }
    }

    /// Next delay and bump the attempt counter. Full jitter: uniform in
    /// `[0, min(cap, base * 2^attempt))`.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.base.as_secs_f64() * 2f64.powi(self.attempt as i32);
        let capped = exp.min(self.cap.as_secs_f64());
        self.attempt = self.attempt.saturating_add(1);
        let jittered = rand::thread_rng().gen_range(0.0..=capped);
        Duration::from_secs_f64(jittered)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_cap() {
        let mut backoff = Backoff::new();
        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay <= Duration::from_secs(60));
        }
    }

    #[test]
    fn reset_restarts_growth() {
        let mut backoff = Backoff::new();
        for _ in 0..10 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.attempt, 0);
    }
}
