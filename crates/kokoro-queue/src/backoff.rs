use std::time::Duration;

/// Exponential backoff: the delay before retry `attempt` (1-based) is
/// `base * 2^(attempt - 1)`. Saturates instead of overflowing.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exp)
}
