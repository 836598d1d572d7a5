//! Wall-clock budget helpers for a single run.

use std::time::{Duration, Instant};

/// Return the time left until `deadline`, or `None` once it has passed.
pub fn remaining_budget(deadline: Instant) -> Option<Duration> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .unwrap_or(Duration::from_secs(0));
    if remaining.is_zero() {
        return None;
    }
    Some(remaining)
}

/// Clamp a per-call timeout to the remaining run budget.
pub fn bounded_timeout(deadline: Instant, timeout: Duration) -> Option<Duration> {
    remaining_budget(deadline).map(|remaining| remaining.min(timeout))
}
