//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Share of the delay added as random jitter, at most.
const JITTER: f64 = 0.1;

/// Delay before retry `attempt` (1-based): `base` doubled per attempt, capped
/// at `max`, then stretched by up to 10%. Attempt 0 waits for nothing.
pub fn exponential_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let Some(doublings) = attempt.checked_sub(1) else {
        return Duration::ZERO;
    };

    let factor = 1u32.checked_shl(doublings).unwrap_or(u32::MAX);
    let delay = base.saturating_mul(factor).min(max);
    delay + delay.mul_f64(rand::thread_rng().gen_range(0.0..JITTER))
}
