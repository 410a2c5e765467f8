use std::time::Duration;

/// Thresholds the trigger policy compares live signals against.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerConfig {
    /// Messages per second the chat must exceed
    pub activity_threshold: f64,

    /// Sentiment the current message must exceed, in [-1, 1]
    pub sentiment_threshold: f64,

    /// How long a clip records before it is stopped
    pub clip_duration: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            activity_threshold: 50.0 / 60.0,
            sentiment_threshold: 0.05,
            clip_duration: Duration::from_secs(60),
        }
    }
}
