//! Reconnect backoff schedule.

use std::time::Duration;

/// Delay before reconnect attempt number `attempt` (zero-based):
/// `base * 2^attempt`, saturating.
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_the_base_delay() {
        let base = Duration::from_millis(1000);
        let expected = [1000u64, 2000, 4000, 8000, 16000];
        for (attempt, millis) in expected.into_iter().enumerate() {
            assert_eq!(
                reconnect_delay(base, attempt as u32),
                Duration::from_millis(millis)
            );
        }
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let base = Duration::from_secs(u64::MAX / 2);
        assert_eq!(reconnect_delay(base, 40), Duration::MAX);
    }
}
