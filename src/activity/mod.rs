//! Chat activity estimation.
//!
//! Activity is the message arrival rate over the retained sample window,
//! measured against the elapsed span of the retained samples rather than a
//! fixed wall-clock window.

mod window;

pub use window::TimestampWindow;

use tokio::time::Instant;

/// Samples kept by default.
pub const DEFAULT_WINDOW_CAPACITY: usize = 60;

#[derive(Debug, Clone)]
pub struct ActivityEstimator {
    window: TimestampWindow,
}

impl ActivityEstimator {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: TimestampWindow::with_capacity(capacity),
        }
    }

    /// Records one message arrival.
    pub fn observe(&mut self, instant: Instant) {
        self.window.push(instant);
    }

    /// Messages per second over the retained window.
    ///
    /// Zero with fewer than two samples or when every retained sample shares
    /// the same instant.
    pub fn rate(&self) -> f64 {
        if self.window.len() < 2 {
            return 0.0;
        }

        let span = self.window.span().as_secs_f64();
        if span > 0.0 {
            self.window.len() as f64 / span
        } else {
            0.0
        }
    }

    pub fn samples(&self) -> usize {
        self.window.len()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for ActivityEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[test]
    fn rate_is_zero_without_two_samples() {
        let mut estimator = ActivityEstimator::default();
        assert_eq!(estimator.rate(), 0.0);

        estimator.observe(Instant::now());
        assert_eq!(estimator.rate(), 0.0);
    }

    #[test]
    fn rate_is_zero_for_identical_instants() {
        let now = Instant::now();
        let mut estimator = ActivityEstimator::default();
        estimator.observe(now);
        estimator.observe(now);
        estimator.observe(now);

        assert_eq!(estimator.rate(), 0.0);
    }

    #[test]
    fn rate_counts_samples_over_span() {
        let base = Instant::now();
        let mut estimator = ActivityEstimator::new(60);
        for i in 0..11 {
            estimator.observe(base + Duration::from_millis(i * 200));
        }

        // 11 samples across 2 seconds
        assert!((estimator.rate() - 5.5).abs() < 1e-9);
    }

    #[test]
    fn rate_only_reflects_retained_samples() {
        let base = Instant::now();
        let mut estimator = ActivityEstimator::new(4);

        // slow start, then a burst
        estimator.observe(base);
        estimator.observe(base + Duration::from_secs(10));
        for i in 1..=4 {
            estimator.observe(base + Duration::from_secs(20) + Duration::from_millis(i * 100));
        }

        assert_eq!(estimator.samples(), 4);
        // 4 samples across 300ms
        assert!((estimator.rate() - 4.0 / 0.3).abs() < 1e-6);
    }

    #[test]
    fn reset_drops_history() {
        let base = Instant::now();
        let mut estimator = ActivityEstimator::default();
        estimator.observe(base);
        estimator.observe(base + Duration::from_secs(1));
        estimator.reset();

        assert_eq!(estimator.samples(), 0);
        assert_eq!(estimator.rate(), 0.0);
    }
}
