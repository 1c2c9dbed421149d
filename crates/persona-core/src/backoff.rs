//! Exponential backoff shared by the health check, step failure backoff and
//! rate-limit cooldown.

use std::time::Duration;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
///
/// Attempt `0` means "no failure yet" and yields zero.
///
/// ```
/// use std::time::Duration;
/// use persona_core::backoff::backoff_delay;
///
/// let base = Duration::from_secs(10);
/// let cap = Duration::from_secs(60);
/// assert_eq!(backoff_delay(1, base, cap), Duration::from_secs(10));
/// assert_eq!(backoff_delay(3, base, cap), Duration::from_secs(40));
/// assert_eq!(backoff_delay(9, base, cap), cap);
/// ```
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(cap, |delay| delay.min(cap))
}
