//! Trigger decision policy.
//!
//! A pure function of the current signals and the recorder's session
//! snapshot. No I/O and no state of its own.

mod config;

pub use config::TriggerConfig;

use crate::recorder::{RecordingState, SessionSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    StartClip,
    StopClip,
    NoAction,
}

#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    config: TriggerConfig,
}

impl TriggerPolicy {
    pub fn new(config: TriggerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Decides what the recorder should do next.
    ///
    /// While idle a clip starts only when activity and sentiment both clear
    /// their thresholds and the message is not spam. While recording only the
    /// elapsed clip time matters. Transitional states never produce a decision.
    pub fn evaluate(
        &self,
        rate: f64,
        sentiment: f64,
        is_repetitive: bool,
        session: SessionSnapshot,
    ) -> Decision {
        match session.state {
            RecordingState::Idle => {
                if rate > self.config.activity_threshold
                    && sentiment > self.config.sentiment_threshold
                    && !is_repetitive
                {
                    Decision::StartClip
                } else {
                    Decision::NoAction
                }
            }
            RecordingState::Recording => {
                if session.elapsed >= self.config.clip_duration {
                    Decision::StopClip
                } else {
                    Decision::NoAction
                }
            }
            RecordingState::Starting | RecordingState::Stopping => Decision::NoAction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy() -> TriggerPolicy {
        TriggerPolicy::new(TriggerConfig {
            activity_threshold: 5.0,
            sentiment_threshold: 0.5,
            clip_duration: Duration::from_secs(30),
        })
    }

    fn idle() -> SessionSnapshot {
        SessionSnapshot::idle()
    }

    fn recording(elapsed_secs: u64) -> SessionSnapshot {
        SessionSnapshot {
            state: RecordingState::Recording,
            elapsed: Duration::from_secs(elapsed_secs),
        }
    }

    #[test]
    fn starts_when_all_gates_pass() {
        assert_eq!(policy().evaluate(10.0, 0.9, false, idle()), Decision::StartClip);
    }

    #[test]
    fn repetitive_message_blocks_start() {
        assert_eq!(policy().evaluate(10.0, 0.9, true, idle()), Decision::NoAction);
    }

    #[test]
    fn low_activity_blocks_start() {
        assert_eq!(policy().evaluate(0.1, 0.9, false, idle()), Decision::NoAction);
    }

    #[test]
    fn low_sentiment_blocks_start() {
        assert_eq!(policy().evaluate(10.0, 0.2, false, idle()), Decision::NoAction);
    }

    #[test]
    fn thresholds_are_strict() {
        assert_eq!(policy().evaluate(5.0, 0.9, false, idle()), Decision::NoAction);
        assert_eq!(policy().evaluate(10.0, 0.5, false, idle()), Decision::NoAction);
    }

    #[test]
    fn nan_signals_never_start() {
        assert_eq!(policy().evaluate(f64::NAN, 0.9, false, idle()), Decision::NoAction);
        assert_eq!(policy().evaluate(10.0, f64::NAN, false, idle()), Decision::NoAction);
    }

    #[test]
    fn recording_ignores_signals_until_clip_length() {
        let policy = policy();
        assert_eq!(policy.evaluate(10.0, 0.9, false, recording(5)), Decision::NoAction);
        assert_eq!(policy.evaluate(0.0, -1.0, true, recording(29)), Decision::NoAction);
        assert_eq!(policy.evaluate(0.0, -1.0, true, recording(30)), Decision::StopClip);
        assert_eq!(policy.evaluate(10.0, 0.9, false, recording(45)), Decision::StopClip);
    }

    #[test]
    fn transitional_states_do_nothing() {
        let policy = policy();
        for state in [RecordingState::Starting, RecordingState::Stopping] {
            let session = SessionSnapshot {
                state,
                elapsed: Duration::from_secs(600),
            };
            assert_eq!(policy.evaluate(10.0, 0.9, false, session), Decision::NoAction);
        }
    }
}
