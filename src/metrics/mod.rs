//! Engine counters, shared between the orchestrator and whoever wants a
//! snapshot (the binary logs one on shutdown).

mod types;

pub use types::{ClipRecord, MetricsSnapshot};

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Duration;

const MAX_RECENT_CLIPS: usize = 20;

#[derive(Default)]
struct MetricsState {
    snapshot: MetricsSnapshot,
}

#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one processed message along with the estimator and sentiment
    /// readings taken for it.
    pub async fn record_message(&self, rate: f64, sentiment: Option<f64>, repetitive: bool) {
        let mut state = self.inner.lock().await;
        let snapshot = &mut state.snapshot;
        snapshot.messages_processed += 1;
        snapshot.last_rate = rate;
        if sentiment.is_some() {
            snapshot.last_sentiment = sentiment;
        }
        if repetitive {
            snapshot.repetitive_messages += 1;
        }
    }

    pub async fn record_scoring_failure(&self) {
        self.inner.lock().await.snapshot.scoring_failures += 1;
    }

    pub async fn record_clip_started(&self) {
        self.inner.lock().await.snapshot.clips_started += 1;
    }

    pub async fn record_clip_completed(&self, session_id: &str, duration: Duration) {
        let mut state = self.inner.lock().await;
        let snapshot = &mut state.snapshot;
        snapshot.clips_completed += 1;
        snapshot.recent_clips.push(ClipRecord {
            session_id: session_id.to_string(),
            stopped_at: chrono::Utc::now(),
            duration_ms: duration.as_millis() as u64,
        });

        if snapshot.recent_clips.len() > MAX_RECENT_CLIPS {
            snapshot.recent_clips.remove(0);
        }
    }

    pub async fn record_backend_retry(&self) {
        self.inner.lock().await.snapshot.backend_retries += 1;
    }

    pub async fn record_backend_failure(&self) {
        self.inner.lock().await.snapshot.backend_failures += 1;
    }

    /// Queue drops are counted by the queue itself; this mirrors the total.
    pub async fn set_queue_drops(&self, dropped: u64) {
        self.inner.lock().await.snapshot.queue_drops = dropped;
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().await.snapshot.clone()
    }

    pub async fn reset(&self) {
        self.inner.lock().await.snapshot = MetricsSnapshot::default();
    }
}
