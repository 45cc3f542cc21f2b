//! Deadline and sub-budget arithmetic for a voice session. Pure functions,
//! no I/O, so the state machine's timing decisions are unit-testable
//! without a clock mock.

use std::time::Duration;

pub const DEFAULT_DEADLINE_MS: u64 = 8_000;
pub const MAX_DEADLINE_MS: u64 = 15_000;
pub const TTS_SAFETY_MARGIN_MS: u64 = 200;
pub const STT_SUB_BUDGET_FRACTION: f64 = 0.4;
pub const AI_SUB_BUDGET_FRACTION: f64 = 0.4;
pub const RETRY_MIN_REMAINING_FRACTION: f64 = 0.25;

/// Resolve the caller-supplied `deadline_ms` against the default and cap:
/// absent -> default; present -> capped at `MAX_DEADLINE_MS` (a caller may
/// ask for less than the default, never more than the cap).
pub fn resolve_deadline_ms(requested: Option<u64>) -> u64 {
    requested.unwrap_or(DEFAULT_DEADLINE_MS).min(MAX_DEADLINE_MS)
}

pub fn remaining(deadline: std::time::Instant) -> Duration {
    deadline.saturating_duration_since(std::time::Instant::now())
}

pub fn stt_sub_budget(remaining: Duration) -> Duration {
    remaining.mul_f64(STT_SUB_BUDGET_FRACTION)
}

pub fn ai_sub_budget(remaining: Duration) -> Duration {
    remaining.mul_f64(AI_SUB_BUDGET_FRACTION)
}

pub fn tts_sub_budget(remaining: Duration) -> Duration {
    remaining.saturating_sub(Duration::from_millis(TTS_SAFETY_MARGIN_MS))
}

/// Whether a transient failure with `sub_budget` allotted and `elapsed`
/// already spent is eligible for one retry (>=25% of the sub-budget left).
pub fn retry_eligible(sub_budget: Duration, elapsed: Duration) -> bool {
    let left = sub_budget.saturating_sub(elapsed);
    left.as_secs_f64() >= sub_budget.as_secs_f64() * RETRY_MIN_REMAINING_FRACTION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_deadline_uses_default() {
        assert_eq!(resolve_deadline_ms(None), DEFAULT_DEADLINE_MS);
    }

    #[test]
    fn requested_deadline_is_capped() {
        assert_eq!(resolve_deadline_ms(Some(100_000)), MAX_DEADLINE_MS);
    }

    #[test]
    fn requested_deadline_below_default_is_honored() {
        assert_eq!(resolve_deadline_ms(Some(2_000)), 2_000);
    }

    #[test]
    fn tts_budget_reserves_safety_margin() {
        let remaining = Duration::from_millis(1_000);
        assert_eq!(tts_sub_budget(remaining), Duration::from_millis(800));
    }

    #[test]
    fn retry_eligible_requires_quarter_of_sub_budget_remaining() {
        let sub_budget = Duration::from_millis(1_000);
        assert!(retry_eligible(sub_budget, Duration::from_millis(700)));
        assert!(!retry_eligible(sub_budget, Duration::from_millis(800)));
    }
}
