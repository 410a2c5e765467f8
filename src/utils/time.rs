use tokio::time::{Duration, Instant};

/// Longest wait any deadline is allowed to span.
pub const MAX_WAIT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// `now + delay`, capped at `MAX_WAIT` so oversized delays cannot overflow.
pub fn deadline_after(delay: Duration) -> Instant {
    Instant::now() + delay.min(MAX_WAIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn huge_delay_is_capped() {
        let now = Instant::now();
        assert_eq!(deadline_after(Duration::MAX), now + MAX_WAIT);
        assert_eq!(deadline_after(Duration::from_millis(50)), now + Duration::from_millis(50));
    }
}
