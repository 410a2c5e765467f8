use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClipRecord {
    pub session_id: String,
    pub stopped_at: DateTime<Utc>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub messages_processed: u64,
    pub scoring_failures: u64,
    pub repetitive_messages: u64,
    pub clips_started: u64,
    pub clips_completed: u64,
    pub backend_retries: u64,
    pub backend_failures: u64,
    pub queue_drops: u64,
    pub last_rate: f64,
    pub last_sentiment: Option<f64>,
    pub recent_clips: Vec<ClipRecord>,
}
