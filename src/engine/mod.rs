//! Engine lifecycle: wires the chat pump and the orchestrator together under
//! one cancellation token.

pub mod events;
pub mod orchestrator;

pub use events::EngineEvent;
pub use orchestrator::{LoopConfig, Orchestrator, Step};

use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::activity::ActivityEstimator;
use crate::chat::{chat_queue, pump_transport, ChatTransport, PumpConfig, QueueSender};
use crate::config::EngineConfig;
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::policy::TriggerPolicy;
use crate::recorder::{RecorderError, RecordingBackend, RecordingController};
use crate::sentiment::{ScoreStore, SentimentCache, SentimentScorer};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("engine task failed to join: {0}")]
    Join(#[from] JoinError),
}

/// A fully wired engine that has not started yet.
pub struct Engine {
    orchestrator: Orchestrator,
    sender: QueueSender,
    pump: PumpConfig,
}

impl Engine {
    pub fn new(
        config: &EngineConfig,
        scorer: Arc<dyn SentimentScorer>,
        backend: Arc<dyn RecordingBackend>,
        store: Option<Arc<dyn ScoreStore>>,
    ) -> Self {
        let trigger = config.trigger_config();
        let (sender, receiver) = chat_queue(&config.queue_config());

        let mut sentiment = SentimentCache::new(scorer);
        if let Some(store) = store {
            sentiment = sentiment.with_store(store);
        }

        let recorder = RecordingController::new(backend, trigger.clip_duration, config.retry_policy());
        let orchestrator = Orchestrator::new(
            ActivityEstimator::new(config.activity.window_capacity),
            sentiment,
            TriggerPolicy::new(trigger),
            recorder,
            receiver,
            config.loop_config(),
        );

        Self {
            orchestrator,
            sender,
            pump: config.pump_config(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.orchestrator.subscribe()
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.orchestrator.metrics()
    }

    pub fn start(self, transport: Box<dyn ChatTransport>) -> EngineHandle {
        let cancel_token = CancellationToken::new();

        info!("starting engine on {} transport", transport.name());
        let pump = tokio::spawn(pump_transport(
            transport,
            self.sender,
            self.pump,
            cancel_token.clone(),
        ));
        let orchestrator = tokio::spawn(self.orchestrator.run(cancel_token.clone()));

        EngineHandle {
            cancel_token,
            pump,
            orchestrator,
        }
    }
}

/// Running engine. Dropping it detaches the tasks; call `stop` to shut down.
pub struct EngineHandle {
    cancel_token: CancellationToken,
    pump: JoinHandle<()>,
    orchestrator: JoinHandle<Result<MetricsSnapshot, EngineError>>,
}

impl EngineHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Requests shutdown and waits for both tasks. The orchestrator closes any
    /// open clip before this returns.
    pub async fn stop(self) -> Result<MetricsSnapshot, EngineError> {
        self.cancel_token.cancel();
        if let Err(err) = self.pump.await {
            warn!("chat pump task failed: {err}");
        }
        self.orchestrator.await?
    }

    /// Waits for the engine to end by itself: input closed or the backend
    /// gave up on stopping a clip.
    pub async fn wait(self) -> Result<MetricsSnapshot, EngineError> {
        let result = self.orchestrator.await?;
        self.cancel_token.cancel();
        if let Err(err) = self.pump.await {
            warn!("chat pump task failed: {err}");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio::io::{AsyncWriteExt, BufReader};
    use tokio::time::{self, Duration};

    use super::*;
    use crate::chat::LineTransport;
    use crate::recorder::ConnectionError;
    use crate::sentiment::{LexiconScorer, MemoryScoreStore};

    #[derive(Default)]
    struct CountingBackend {
        begins: AtomicU32,
        ends: AtomicU32,
    }

    #[async_trait]
    impl RecordingBackend for CountingBackend {
        async fn begin(&self) -> Result<(), ConnectionError> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn end(&self) -> Result<(), ConnectionError> {
            self.ends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.trigger.activity_threshold = 1.0;
        config.trigger.sentiment_threshold = 0.3;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn stop_closes_clip_started_from_piped_chat() {
        let backend = Arc::new(CountingBackend::default());
        let store = Arc::new(MemoryScoreStore::new());
        let engine = Engine::new(
            &config(),
            Arc::new(LexiconScorer::new()),
            Arc::clone(&backend) as Arc<dyn RecordingBackend>,
            Some(Arc::clone(&store) as Arc<dyn ScoreStore>),
        );
        let mut events = engine.subscribe();

        let (mut writer, reader) = tokio::io::duplex(1024);
        let handle = engine.start(Box::new(LineTransport::new(BufReader::new(reader), "pipe")));

        for line in ["this is amazing\n", "wow great play\n", "love it\n"] {
            writer.write_all(line.as_bytes()).await.unwrap();
            time::sleep(Duration::from_millis(100)).await;
        }
        time::sleep(Duration::from_secs(2)).await;

        assert_eq!(backend.begins.load(Ordering::SeqCst), 1);
        assert!(matches!(events.recv().await.unwrap(), EngineEvent::ClipStarted { .. }));

        let snapshot = handle.stop().await.unwrap();
        assert_eq!(backend.ends.load(Ordering::SeqCst), 1);
        assert_eq!(snapshot.messages_processed, 3);
        assert_eq!(snapshot.clips_completed, 1);
        assert!(!store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_when_input_ends() {
        let backend = Arc::new(CountingBackend::default());
        let engine = Engine::new(
            &config(),
            Arc::new(LexiconScorer::new()),
            Arc::clone(&backend) as Arc<dyn RecordingBackend>,
            None,
        );
        let input: &[u8] = b"boring\nmeh\n";
        let handle = engine.start(Box::new(LineTransport::new(input, "replay")));

        let snapshot = handle.wait().await.unwrap();
        assert_eq!(snapshot.messages_processed, 2);
        assert_eq!(backend.begins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_line_does_not_end_monitoring() {
        let backend = Arc::new(CountingBackend::default());
        let engine = Engine::new(
            &config(),
            Arc::new(LexiconScorer::new()),
            Arc::clone(&backend) as Arc<dyn RecordingBackend>,
            None,
        );
        let input: &[u8] = b"hello\n\xff\xfe bad bytes\nthis is amazing\nwow great play\nlove it\n";
        let handle = engine.start(Box::new(LineTransport::new(input, "replay")));

        let snapshot = handle.wait().await.unwrap();
        assert_eq!(snapshot.messages_processed, 4);
    }
}
