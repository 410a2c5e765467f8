use tokio::sync::broadcast;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;

use super::events::{event_channel, EngineEvent};
use super::EngineError;
use crate::activity::ActivityEstimator;
use crate::chat::{ChatMessage, Pop, QueueReceiver};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::policy::{Decision, TriggerPolicy};
use crate::recorder::{BackendOp, RecorderError, RecordingController, Transition};
use crate::sentiment::SentimentCache;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(100);

/// Chat command that reports the current activity level.
const ACTIVITY_COMMAND: &str = "!activity";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// How long one pull waits for a message
    pub poll_timeout: Duration,
    /// Pause after a pull that came back empty. A pull that returns a message
    /// is followed straight by the next one, so a busy chat is never paced
    /// down to one message per interval.
    pub idle_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            idle_interval: DEFAULT_IDLE_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Processed,
    Idle,
    Closed,
    Cancelled,
}

/// The single decision loop. Owns the estimator, the sentiment cache and the
/// recording controller outright, so none of them need locking.
pub struct Orchestrator {
    estimator: ActivityEstimator,
    sentiment: SentimentCache,
    policy: TriggerPolicy,
    recorder: RecordingController,
    queue: QueueReceiver,
    config: LoopConfig,
    last_sentiment: Option<f64>,
    events: broadcast::Sender<EngineEvent>,
    metrics: MetricsCollector,
}

impl Orchestrator {
    pub fn new(
        estimator: ActivityEstimator,
        sentiment: SentimentCache,
        policy: TriggerPolicy,
        recorder: RecordingController,
        queue: QueueReceiver,
        config: LoopConfig,
    ) -> Self {
        Self {
            estimator,
            sentiment,
            policy,
            recorder,
            queue,
            config,
            last_sentiment: None,
            events: event_channel(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    pub fn recorder(&self) -> &RecordingController {
        &self.recorder
    }

    pub fn estimator(&self) -> &ActivityEstimator {
        &self.estimator
    }

    pub fn last_sentiment(&self) -> Option<f64> {
        self.last_sentiment
    }

    /// Runs until cancelled, the chat input closes, or the backend can no
    /// longer stop a clip. An open clip is ended before returning.
    pub async fn run(mut self, cancel_token: CancellationToken) -> Result<MetricsSnapshot, EngineError> {
        log_info!("orchestrator started");

        let outcome = loop {
            match self.step(&cancel_token).await {
                Ok(Step::Processed) | Ok(Step::Idle) => {}
                Ok(Step::Closed) => {
                    log_info!("chat input closed");
                    break Ok(());
                }
                Ok(Step::Cancelled) => {
                    log_info!("orchestrator shutting down");
                    break Ok(());
                }
                Err(err) => break Err(err),
            }
        };

        self.queue.close();

        let shutdown = if self.recorder.is_halted() {
            log_error!("skipping final end call, backend already gave up on stopping the clip");
            Ok(())
        } else {
            match self.recorder.shutdown().await {
                Ok(Some(transition)) => {
                    self.on_transition(transition).await;
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(err) => {
                    self.alert(&err).await;
                    Err(EngineError::from(err))
                }
            }
        };

        self.metrics.set_queue_drops(self.queue.dropped()).await;
        let snapshot = self.metrics.get_snapshot().await;
        outcome?;
        shutdown?;
        Ok(snapshot)
    }

    /// One pass of the loop: settle backend work, pull at most one message,
    /// and act on it.
    pub async fn step(&mut self, cancel_token: &CancellationToken) -> Result<Step, EngineError> {
        self.drive_recorder().await?;

        let pulled = tokio::select! {
            pulled = self.queue.pop(self.config.poll_timeout) => pulled,
            _ = cancel_token.cancelled() => return Ok(Step::Cancelled),
        };

        match pulled {
            Pop::Message(message) => {
                self.handle_message(message).await;
                Ok(Step::Processed)
            }
            Pop::Empty => {
                self.check_clip_length();
                tokio::select! {
                    _ = time::sleep(self.config.idle_interval) => Ok(Step::Idle),
                    _ = cancel_token.cancelled() => Ok(Step::Cancelled),
                }
            }
            Pop::Closed => Ok(Step::Closed),
        }
    }

    async fn drive_recorder(&mut self) -> Result<(), EngineError> {
        match self.recorder.poll().await {
            Ok(None) => Ok(()),
            Ok(Some(transition)) => {
                self.on_transition(transition).await;
                Ok(())
            }
            Err(err) => {
                self.alert(&err).await;
                match err {
                    // the controller is back to idle; keep monitoring
                    RecorderError::RetriesExhausted {
                        op: BackendOp::Begin,
                        ..
                    } => Ok(()),
                    other => Err(other.into()),
                }
            }
        }
    }

    async fn handle_message(&mut self, message: ChatMessage) {
        self.estimator.observe(message.received_at);
        let rate = self.estimator.rate();
        // scored and counted on the exact text, like the cache keys it
        let text = message.text.as_str();

        if text.trim() == ACTIVITY_COMMAND {
            log_info!(
                "chat activity: {rate:.2} msgs/s across the last {} messages",
                self.estimator.samples()
            );
            self.metrics.record_message(rate, None, false).await;
            self.check_clip_length();
            return;
        }

        let scored = match self.sentiment.score(text).await {
            Ok(score) => {
                self.last_sentiment = Some(score);
                Some(score)
            }
            Err(err) => {
                log_warn!("{err}; keeping last known sentiment");
                self.metrics.record_scoring_failure().await;
                None
            }
        };
        let repetitive = self.sentiment.is_repetitive(text);
        self.metrics.record_message(rate, scored, repetitive).await;

        // no sentiment seen yet means nothing can clear the start threshold
        let sentiment = self.last_sentiment.unwrap_or(f64::NEG_INFINITY);
        let decision = self
            .policy
            .evaluate(rate, sentiment, repetitive, self.recorder.snapshot());
        log_debug!(
            "rate={rate:.2} sentiment={sentiment:.3} repetitive={repetitive} -> {decision:?}"
        );
        self.apply(decision);
    }

    /// Evaluates only the stop condition, for ticks without a message.
    fn check_clip_length(&mut self) {
        let decision = self.policy.evaluate(
            self.estimator.rate(),
            f64::NEG_INFINITY,
            false,
            self.recorder.snapshot(),
        );
        self.apply(decision);
    }

    fn apply(&mut self, decision: Decision) {
        if decision != Decision::NoAction && self.recorder.apply(decision) {
            log_debug!("issued {decision:?} to the recorder");
        }
    }

    async fn on_transition(&mut self, transition: Transition) {
        let event = match transition {
            Transition::Started { session_id } => {
                log_info!("clip {session_id} started");
                self.metrics.record_clip_started().await;
                EngineEvent::ClipStarted { session_id }
            }
            Transition::Stopped {
                session_id,
                duration,
            } => {
                log_info!("clip {session_id} saved ({:.1}s)", duration.as_secs_f64());
                self.metrics.record_clip_completed(&session_id, duration).await;
                EngineEvent::ClipStopped {
                    session_id,
                    duration_ms: duration.as_millis() as u64,
                }
            }
            Transition::RetryScheduled {
                op,
                attempt,
                delay,
                error,
            } => {
                self.metrics.record_backend_retry().await;
                EngineEvent::BackendRetry {
                    op,
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error: error.to_string(),
                }
            }
        };
        self.emit(event);
    }

    async fn alert(&mut self, err: &RecorderError) {
        log_error!("recording backend alert: {err}");
        self.metrics.record_backend_failure().await;
        if let RecorderError::RetriesExhausted {
            op,
            attempts,
            last_error,
        } = err
        {
            self.emit(EngineEvent::BackendFailed {
                op: *op,
                attempts: *attempts,
                error: last_error.to_string(),
            });
        }
    }

    fn emit(&self, event: EngineEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
