use std::sync::Arc;

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Duration, Instant};

use super::backend::{BackendOp, ConnectionError, RecordingBackend};
use super::state::{RecordingSession, RecordingState, SessionSnapshot};
use crate::policy::Decision;
use crate::utils::time::deadline_after;

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 12;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts allowed for the final `end` call at shutdown when retries are
/// otherwise unbounded.
const SHUTDOWN_STOP_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between a failed call and the next attempt
    pub backoff: Duration,
    /// Attempts per transition before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
    /// Upper bound on a single backend call
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: DEFAULT_RETRY_BACKOFF,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(false, |max| attempts >= max)
    }
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("backend {op} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        op: BackendOp,
        attempts: u32,
        last_error: ConnectionError,
    },

    #[error("cannot reset while the recording session is {0:?}")]
    SessionOpen(RecordingState),
}

/// Observable outcome of a settled backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Started {
        session_id: String,
    },
    Stopped {
        session_id: String,
        duration: Duration,
    },
    RetryScheduled {
        op: BackendOp,
        attempt: u32,
        delay: Duration,
        error: ConnectionError,
    },
}

struct CallOutcome {
    result: Result<(), ConnectionError>,
    finished_at: Instant,
}

enum PendingCall {
    InFlight {
        op: BackendOp,
        handle: JoinHandle<CallOutcome>,
    },
    Backoff {
        op: BackendOp,
        retry_at: Instant,
    },
}

/// Owns the single recording session and every call made to the backend.
///
/// Backend calls run on their own task so the caller's loop keeps draining
/// chat while a call is outstanding. At most one call is in flight, and a
/// transition issues exactly one successful call.
pub struct RecordingController {
    backend: Arc<dyn RecordingBackend>,
    retry: RetryPolicy,
    session: RecordingSession,
    pending: Option<PendingCall>,
    attempts: u32,
    halted: bool,
}

impl RecordingController {
    pub fn new(backend: Arc<dyn RecordingBackend>, clip_duration: Duration, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            session: RecordingSession::new(clip_duration),
            pending: None,
            attempts: 0,
            halted: false,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.session.state
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot_at(Instant::now())
    }

    /// A backend call is outstanding or waiting out its backoff.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// `end` ran out of retries and the remote recording may still be open.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Acts on a policy decision. Returns whether a backend call was issued.
    ///
    /// Starting is only possible from `Idle` and stopping only from
    /// `Recording`; anything else is a no-op.
    pub fn apply(&mut self, decision: Decision) -> bool {
        match decision {
            Decision::StartClip => {
                if self.session.state != RecordingState::Idle {
                    debug!("start ignored while {:?}", self.session.state);
                    return false;
                }
                let session_id = self.session.begin_starting();
                info!("starting clip {session_id} via {}", self.backend.name());
                self.attempts = 0;
                self.dispatch(BackendOp::Begin);
                true
            }
            Decision::StopClip => {
                if self.session.state != RecordingState::Recording {
                    debug!("stop ignored while {:?}", self.session.state);
                    return false;
                }
                self.session.begin_stopping();
                info!(
                    "stopping clip {}",
                    self.session.session_id.as_deref().unwrap_or("?")
                );
                self.attempts = 0;
                self.dispatch(BackendOp::End);
                true
            }
            Decision::NoAction => false,
        }
    }

    /// Settles a finished call or fires a retry whose backoff has elapsed.
    ///
    /// Never waits on the backend.
    pub async fn poll(&mut self) -> Result<Option<Transition>, RecorderError> {
        match self.pending.take() {
            None => Ok(None),
            Some(PendingCall::Backoff { op, retry_at }) => {
                if Instant::now() >= retry_at {
                    debug!("retrying backend {op} (attempt {})", self.attempts + 1);
                    self.dispatch(op);
                } else {
                    self.pending = Some(PendingCall::Backoff { op, retry_at });
                }
                Ok(None)
            }
            Some(PendingCall::InFlight { op, handle }) => {
                if !handle.is_finished() {
                    self.pending = Some(PendingCall::InFlight { op, handle });
                    return Ok(None);
                }
                let outcome = join_outcome(handle.await);
                self.complete(op, outcome)
            }
        }
    }

    /// Closes out the session for shutdown.
    ///
    /// Waits for an outstanding call, abandons a start that never succeeded,
    /// and issues `end` for anything that may be recording.
    ///
    /// Returns the `Stopped` transition when a clip was closed on the way out.
    pub async fn shutdown(&mut self) -> Result<Option<Transition>, RecorderError> {
        let mut settled = None;
        if let Some(PendingCall::InFlight { op, handle }) = self.pending.take() {
            let outcome = join_outcome(handle.await);
            match outcome.result {
                Ok(()) => settled = Some(self.succeed(op, outcome.finished_at)),
                Err(err) => warn!("backend {op} failed during shutdown: {err}"),
            }
        }

        match self.session.state {
            RecordingState::Idle => Ok(settled),
            RecordingState::Starting => {
                info!("abandoning clip start on shutdown");
                self.session.reset();
                self.attempts = 0;
                Ok(None)
            }
            RecordingState::Recording | RecordingState::Stopping => {
                self.session.begin_stopping();
                self.stop_until_done().await.map(Some)
            }
        }
    }

    /// Returns to `Idle` after an abandoned start. Refused while a recording
    /// may be open.
    pub fn reset(&mut self) -> Result<(), RecorderError> {
        match self.session.state {
            RecordingState::Recording | RecordingState::Stopping => {
                Err(RecorderError::SessionOpen(self.session.state))
            }
            RecordingState::Idle | RecordingState::Starting => {
                if let Some(PendingCall::InFlight { handle, .. }) = self.pending.take() {
                    handle.abort();
                }
                self.pending = None;
                self.session.reset();
                self.attempts = 0;
                self.halted = false;
                Ok(())
            }
        }
    }

    fn dispatch(&mut self, op: BackendOp) {
        let backend = Arc::clone(&self.backend);
        let timeout = self.retry.call_timeout;
        let handle = tokio::spawn(async move {
            let result = call_backend(backend.as_ref(), op, timeout).await;
            CallOutcome {
                result,
                finished_at: Instant::now(),
            }
        });
        self.pending = Some(PendingCall::InFlight { op, handle });
    }

    fn complete(&mut self, op: BackendOp, outcome: CallOutcome) -> Result<Option<Transition>, RecorderError> {
        self.attempts = self.attempts.saturating_add(1);

        let error = match outcome.result {
            Ok(()) => return Ok(Some(self.succeed(op, outcome.finished_at))),
            Err(error) => error,
        };

        if self.retry.exhausted(self.attempts) {
            return Err(self.give_up(op, error));
        }

        let delay = self.retry.backoff;
        warn!(
            "backend {op} failed (attempt {}): {error}; retrying in {delay:?}",
            self.attempts
        );
        self.pending = Some(PendingCall::Backoff {
            op,
            retry_at: deadline_after(delay),
        });
        Ok(Some(Transition::RetryScheduled {
            op,
            attempt: self.attempts,
            delay,
            error,
        }))
    }

    fn succeed(&mut self, op: BackendOp, finished_at: Instant) -> Transition {
        self.attempts = 0;
        let session_id = self.session.session_id.clone().unwrap_or_default();
        match op {
            BackendOp::Begin => {
                self.session.mark_recording(finished_at);
                info!("clip {session_id} recording");
                Transition::Started { session_id }
            }
            BackendOp::End => {
                let duration = self.session.elapsed_at(finished_at);
                self.session.reset();
                self.halted = false;
                info!("clip {session_id} stopped after {duration:?}");
                Transition::Stopped {
                    session_id,
                    duration,
                }
            }
        }
    }

    fn give_up(&mut self, op: BackendOp, last_error: ConnectionError) -> RecorderError {
        let attempts = self.attempts;
        self.attempts = 0;
        match op {
            BackendOp::Begin => {
                error!("giving up on starting clip after {attempts} attempts: {last_error}");
                self.session.reset();
            }
            BackendOp::End => {
                error!(
                    "giving up on stopping clip after {attempts} attempts, remote recording may still be running: {last_error}"
                );
                self.halted = true;
            }
        }
        RecorderError::RetriesExhausted {
            op,
            attempts,
            last_error,
        }
    }

    async fn stop_until_done(&mut self) -> Result<Transition, RecorderError> {
        let max_attempts = self
            .retry
            .max_attempts
            .unwrap_or(SHUTDOWN_STOP_ATTEMPTS)
            .max(1);
        let mut last_error = ConnectionError::Unreachable("no attempt made".into());

        for attempt in 1..=max_attempts {
            match call_backend(self.backend.as_ref(), BackendOp::End, self.retry.call_timeout).await {
                Ok(()) => return Ok(self.succeed(BackendOp::End, Instant::now())),
                Err(err) => {
                    warn!("shutdown end attempt {attempt}/{max_attempts} failed: {err}");
                    last_error = err;
                    if attempt < max_attempts {
                        time::sleep(self.retry.backoff).await;
                    }
                }
            }
        }

        self.halted = true;
        Err(RecorderError::RetriesExhausted {
            op: BackendOp::End,
            attempts: max_attempts,
            last_error,
        })
    }
}

async fn call_backend(
    backend: &dyn RecordingBackend,
    op: BackendOp,
    timeout: Duration,
) -> Result<(), ConnectionError> {
    let call = async {
        match op {
            BackendOp::Begin => backend.begin().await,
            BackendOp::End => backend.end().await,
        }
    };

    match time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::Timeout(timeout)),
    }
}

fn join_outcome(joined: Result<CallOutcome, JoinError>) -> CallOutcome {
    joined.unwrap_or_else(|err| CallOutcome {
        result: Err(ConnectionError::Unreachable(format!("backend task failed: {err}"))),
        finished_at: Instant::now(),
    })
}
