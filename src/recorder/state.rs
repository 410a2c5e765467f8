//! Recording state machine data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

/// Phase of the single logical recording session.
///
/// `Idle → Starting → Recording → Stopping → Idle`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RecordingState {
    Idle,
    Starting,
    Recording,
    Stopping,
}

impl Default for RecordingState {
    fn default() -> Self {
        RecordingState::Idle
    }
}

impl RecordingState {
    /// A remote recording may be running (or about to be).
    pub fn is_open(&self) -> bool {
        !matches!(self, RecordingState::Idle)
    }
}

/// What the trigger policy needs to know about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: RecordingState,
    /// Time since the backend confirmed the recording began; zero unless
    /// recording or stopping.
    pub elapsed: Duration,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Self {
            state: RecordingState::Idle,
            elapsed: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub state: RecordingState,
    pub session_id: Option<String>,
    pub clip_duration_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
    /// Monotonic instant the backend confirmed `begin`.
    #[serde(skip)]
    pub running_anchor: Option<Instant>,
}

impl RecordingSession {
    pub fn new(clip_duration: Duration) -> Self {
        Self {
            state: RecordingState::Idle,
            session_id: None,
            clip_duration_ms: clip_duration.as_millis() as u64,
            started_at: None,
            running_anchor: None,
        }
    }

    pub fn begin_starting(&mut self) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.state = RecordingState::Starting;
        self.session_id = Some(session_id.clone());
        self.started_at = None;
        self.running_anchor = None;
        session_id
    }

    pub fn mark_recording(&mut self, anchor: Instant) {
        self.state = RecordingState::Recording;
        self.started_at = Some(Utc::now());
        self.running_anchor = Some(anchor);
    }

    pub fn begin_stopping(&mut self) {
        self.state = RecordingState::Stopping;
    }

    pub fn elapsed_at(&self, now: Instant) -> Duration {
        match (self.state, self.running_anchor) {
            (RecordingState::Recording | RecordingState::Stopping, Some(anchor)) => {
                now.saturating_duration_since(anchor)
            }
            _ => Duration::ZERO,
        }
    }

    pub fn snapshot_at(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            elapsed: self.elapsed_at(now),
        }
    }

    /// Returns to idle, keeping the configured clip length.
    pub fn reset(&mut self) {
        *self = Self {
            clip_duration_ms: self.clip_duration_ms,
            ..Self::new(Duration::ZERO)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_counts_only_while_open() {
        let mut session = RecordingSession::new(Duration::from_secs(60));
        let start = Instant::now();
        assert_eq!(session.elapsed_at(start + Duration::from_secs(5)), Duration::ZERO);

        session.begin_starting();
        assert_eq!(session.elapsed_at(start + Duration::from_secs(5)), Duration::ZERO);

        session.mark_recording(start);
        assert_eq!(
            session.elapsed_at(start + Duration::from_secs(5)),
            Duration::from_secs(5)
        );

        session.begin_stopping();
        assert_eq!(
            session.snapshot_at(start + Duration::from_secs(7)).elapsed,
            Duration::from_secs(7)
        );
    }

    #[test]
    fn reset_keeps_clip_length() {
        let mut session = RecordingSession::new(Duration::from_secs(45));
        session.begin_starting();
        session.mark_recording(Instant::now());
        session.reset();

        assert_eq!(session.state, RecordingState::Idle);
        assert!(session.session_id.is_none());
        assert!(session.running_anchor.is_none());
        assert_eq!(session.clip_duration_ms, 45_000);
    }

    #[test]
    fn state_serializes_camel_case() {
        let json = serde_json::to_string(&RecordingState::Recording).unwrap();
        assert_eq!(json, "\"recording\"");
    }
}
