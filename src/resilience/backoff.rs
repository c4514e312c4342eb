//! Exponential backoff for retried accept calls.

use std::time::Duration;

/// First delay after a failed accept.
pub const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(5);
/// Ceiling for accept retry delays.
pub const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Calculate exponential backoff delay.
///
/// Attempt 0 means no failure yet and yields no delay.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u32.saturating_pow(attempt - 1);
    base.saturating_mul(exponential_base).min(max)
}

/// Delay before the next accept after `attempt` consecutive failures.
pub fn accept_backoff(attempt: u32) -> Duration {
    calculate_backoff(attempt, ACCEPT_BACKOFF_BASE, ACCEPT_BACKOFF_MAX)
}
