//! # Backoff progression for backoff timers.
//!
//! [`Backoff`] computes how long a backoff timer waits after each fire.
//! It is parameterized by:
//! - [`Backoff::first`] the initial interval;
//! - [`Backoff::max`] the maximum interval cap.
//!
//! The wait after fire `n + 1` is `first × 2^n`, clamped to `max`. Because the
//! value derives purely from the fire count, rounding never accumulates.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use unitvisor::Backoff;
//!
//! let backoff = Backoff::new(Duration::from_secs(8), Duration::from_secs(240)).unwrap();
//!
//! assert_eq!(backoff.delay(0), Duration::from_secs(8));
//! assert_eq!(backoff.delay(1), Duration::from_secs(16));
//! assert_eq!(backoff.delay(5), Duration::from_secs(240)); // 256s capped
//! ```

use std::time::Duration;

use crate::error::RuntimeError;

/// Doubling interval with an upper bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
    /// Initial interval.
    pub first: Duration,
    /// Maximum interval cap.
    pub max: Duration,
}

impl Backoff {
    /// Creates a progression; requires `0 < first < max`.
    pub fn new(first: Duration, max: Duration) -> Result<Self, RuntimeError> {
        if first.is_zero() {
            return Err(RuntimeError::bad_parameter("backoff interval is zero"));
        }
        if first >= max {
            return Err(RuntimeError::bad_parameter(format!(
                "backoff interval {first:?} must be below its maximum {max:?}"
            )));
        }
        Ok(Self { first, max })
    }

    /// Interval for step `n` (0-indexed): `first × 2^n`, clamped to [`Backoff::max`].
    pub fn delay(&self, n: u32) -> Duration {
        const NANOS_PER_SEC: u128 = 1_000_000_000;

        let factor = match 1u128.checked_shl(n) {
            Some(f) if n < 127 => f,
            _ => return self.max,
        };
        match self.first.as_nanos().checked_mul(factor) {
            Some(nanos) if nanos < self.max.as_nanos() => Duration::new(
                (nanos / NANOS_PER_SEC) as u64,
                (nanos % NANOS_PER_SEC) as u32,
            ),
            _ => self.max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(first_ms: u64, max_ms: u64) -> Backoff {
        Backoff::new(
            Duration::from_millis(first_ms),
            Duration::from_millis(max_ms),
        )
        .unwrap()
    }

    #[test]
    fn test_step_zero_returns_first() {
        assert_eq!(policy(100, 30_000).delay(0), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_growth() {
        let p = policy(100, 30_000);
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(2), Duration::from_millis(400));
        assert_eq!(p.delay(3), Duration::from_millis(800));
        assert_eq!(p.delay(4), Duration::from_millis(1600));
    }

    #[test]
    fn test_clamped_to_max() {
        let p = policy(100, 1_000);
        assert_eq!(p.delay(4), Duration::from_millis(1_000));
        assert_eq!(p.delay(10), Duration::from_millis(1_000));
    }

    #[test]
    fn test_huge_step_clamps_to_max() {
        let p = policy(100, 60_000);
        assert_eq!(p.delay(100), Duration::from_secs(60));
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_delays_never_decrease() {
        let p = Backoff::new(Duration::from_secs(8), Duration::from_secs(240)).unwrap();
        let delays: Vec<Duration> = (0..12).map(|n| p.delay(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(240));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            Backoff::new(Duration::ZERO, Duration::from_secs(1)),
            Err(RuntimeError::BadParameter { .. })
        ));
        assert!(matches!(
            Backoff::new(Duration::from_secs(2), Duration::from_secs(2)),
            Err(RuntimeError::BadParameter { .. })
        ));
        assert!(matches!(
            Backoff::new(Duration::from_secs(3), Duration::from_secs(2)),
            Err(RuntimeError::BadParameter { .. })
        ));
    }
}
