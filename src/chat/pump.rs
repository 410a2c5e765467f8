use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::queue::{PushOutcome, QueueSender};
use super::{ChatTransport, TransportError};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct PumpConfig {
    pub receive_timeout: Duration,
    pub reconnect_delay: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Moves messages from `transport` into the queue until cancelled, the source
/// closes, or the consumer goes away. Dropping `sender` on exit closes the
/// queue so the orchestrator sees the end of input.
pub async fn pump_transport(
    mut transport: Box<dyn ChatTransport>,
    sender: QueueSender,
    config: PumpConfig,
    cancel_token: CancellationToken,
) {
    log_info!("chat pump started on {} transport", transport.name());

    loop {
        let received = tokio::select! {
            received = transport.receive(config.receive_timeout) => received,
            _ = cancel_token.cancelled() => {
                log_info!("chat pump shutting down");
                break;
            }
        };

        match received {
            Ok(Some(message)) => match sender.push(message).await {
                PushOutcome::Queued => {}
                PushOutcome::DroppedOldest | PushOutcome::DroppedNewest => {
                    log_debug!("chat queue full, dropped a message");
                }
                PushOutcome::Closed => {
                    log_info!("chat queue closed by consumer, stopping pump");
                    break;
                }
            },
            Ok(None) => {}
            Err(TransportError::Disconnected(reason)) => {
                log_warn!(
                    "{} transport disconnected ({reason}), reconnecting in {:?}",
                    transport.name(),
                    config.reconnect_delay
                );
                tokio::select! {
                    _ = tokio::time::sleep(config.reconnect_delay) => {}
                    _ = cancel_token.cancelled() => break,
                }
            }
            Err(TransportError::Closed) => {
                log_info!("{} transport reached end of input", transport.name());
                break;
            }
            Err(TransportError::Fatal(reason)) => {
                log_error!("{} transport failed: {reason}", transport.name());
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::chat::queue::{chat_queue, Pop, QueueConfig};
    use crate::chat::ChatMessage;

    struct ScriptedTransport {
        script: VecDeque<Result<Option<ChatMessage>, TransportError>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn receive(
            &mut self,
            _timeout: Duration,
        ) -> Result<Option<ChatMessage>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.pop_front().unwrap_or(Err(TransportError::Closed))
        }
    }

    fn scripted(
        script: Vec<Result<Option<ChatMessage>, TransportError>>,
    ) -> (Box<dyn ChatTransport>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let transport = ScriptedTransport {
            script: script.into(),
            calls: Arc::clone(&calls),
        };
        (Box::new(transport), calls)
    }

    fn msg(text: &str) -> Result<Option<ChatMessage>, TransportError> {
        Ok(Some(ChatMessage::new(text, Instant::now())))
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_messages_until_source_closes() {
        let (transport, _) = scripted(vec![msg("one"), Ok(None), msg("two")]);
        let (tx, rx) = chat_queue(&QueueConfig::default());

        pump_transport(transport, tx, PumpConfig::default(), CancellationToken::new()).await;

        let mut texts = Vec::new();
        while let Pop::Message(message) = rx.pop(Duration::ZERO).await {
            texts.push(message.text);
        }
        assert_eq!(texts, vec!["one", "two"]);
        assert_eq!(rx.pop(Duration::ZERO).await, Pop::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_disconnect() {
        let (transport, calls) = scripted(vec![
            Err(TransportError::Disconnected("reset".into())),
            msg("back"),
        ]);
        let (tx, rx) = chat_queue(&QueueConfig::default());

        let started = Instant::now();
        pump_transport(transport, tx, PumpConfig::default(), CancellationToken::new()).await;

        assert!(started.elapsed() >= DEFAULT_RECONNECT_DELAY);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(rx.pop(Duration::ZERO).await, Pop::Message(m) if m.text == "back"));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_stops_pump() {
        let (transport, calls) = scripted(vec![
            Err(TransportError::Fatal("login failed".into())),
            msg("never"),
        ]);
        let (tx, rx) = chat_queue(&QueueConfig::default());

        pump_transport(transport, tx, PumpConfig::default(), CancellationToken::new()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(rx.pop(Duration::ZERO).await, Pop::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_reconnect_wait() {
        let (transport, _) = scripted(vec![Err(TransportError::Disconnected("gone".into()))]);
        let (tx, _rx) = chat_queue(&QueueConfig::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(pump_transport(transport, tx, PumpConfig::default(), cancel.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let started = Instant::now();
        handle.await.unwrap();
        assert!(started.elapsed() < DEFAULT_RECONNECT_DELAY);
    }
}
