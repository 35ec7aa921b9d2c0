use std::time::Duration;

/// Bounded retry with exponential backoff.
///
/// With the defaults (3 attempts, 50ms base) attempt 1 runs immediately,
/// attempt 2 after ~100ms and attempt 3 after a further ~200ms. After the
/// final attempt the operation fails with the last observed status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, counting the first.
    pub attempts: u32,
    /// Base delay; the delay before attempt `n` is `base * 2^(n-1)`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep before the given 1-based attempt number.
    ///
    /// `None` for the first attempt; `base * 2^(n-1)` afterwards.
    pub fn delay_before(&self, attempt: u32) -> Option<Duration> {
        if attempt <= 1 {
            None
        } else {
            Some(self.base_delay * 2u32.pow(attempt - 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_delay_before_first_attempt() {
        assert_eq!(RetryPolicy::default().delay_before(1), None);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(2), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_before(3), Some(Duration::from_millis(200)));
    }

    #[test]
    fn custom_base_scales() {
        let policy = RetryPolicy {
            attempts: 5,
            base_delay: Duration::from_millis(10),
        };
        assert_eq!(policy.delay_before(4), Some(Duration::from_millis(80)));
    }
}
