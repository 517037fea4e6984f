//! Randomized pre-dispatch delay.
//!
//! Concurrent callers that fail together tend to retry together. A small
//! random delay before each guarded call spreads them out.

use std::time::Duration;

use rand::Rng;

/// Default lower bound of the jitter delay.
pub const JITTER_MIN_MS: u64 = 10;

/// Default upper bound of the jitter delay.
pub const JITTER_MAX_MS: u64 = 50;

/// Inclusive jitter bounds in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterBounds {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for JitterBounds {
    fn default() -> Self {
        Self {
            min_ms: JITTER_MIN_MS,
            max_ms: JITTER_MAX_MS,
        }
    }
}

impl JitterBounds {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
        }
    }

    /// No delay at all.
    pub fn none() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    /// Pick a delay uniformly within the bounds.
    pub fn sample(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(self.min_ms..=self.max_ms);
        Duration::from_millis(ms)
    }

    /// Sleep for a sampled delay without blocking the runtime.
    pub async fn delay(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_within_bounds() {
        let bounds = JitterBounds::default();
        for _ in 0..100 {
            let d = bounds.sample().as_millis() as u64;
            assert!((JITTER_MIN_MS..=JITTER_MAX_MS).contains(&d));
        }
    }

    #[test]
    fn test_swapped_bounds_are_normalized() {
        let bounds = JitterBounds::new(40, 20);
        assert_eq!(bounds, JitterBounds { min_ms: 20, max_ms: 40 });
    }

    #[test]
    fn test_none_is_zero() {
        assert_eq!(JitterBounds::none().sample(), Duration::ZERO);
    }
}
