//! Chat ingestion: the transport seam, the bounded hand-off queue, and the
//! pump task connecting them.

pub mod irc;
pub mod lines;
pub mod pump;
pub mod queue;

pub use irc::{IrcConfig, TwitchIrcTransport};
pub use lines::LineTransport;
pub use pump::{pump_transport, PumpConfig};
pub use queue::{chat_queue, OverflowPolicy, Pop, PushOutcome, QueueConfig, QueueReceiver, QueueSender};

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub text: String,
    pub author: Option<String>,
    pub channel: Option<String>,
    pub received_at: Instant,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>, received_at: Instant) -> Self {
        Self {
            text: text.into(),
            author: None,
            channel: None,
            received_at,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection lost; the transport reconnects on the next `receive`.
    #[error("chat transport disconnected: {0}")]
    Disconnected(String),

    /// The source ended normally.
    #[error("chat source closed")]
    Closed,

    #[error("chat transport failed: {0}")]
    Fatal(String),
}

#[async_trait]
pub trait ChatTransport: Send {
    /// Waits up to `timeout` for the next message. `Ok(None)` means nothing
    /// arrived in time.
    async fn receive(&mut self, timeout: Duration) -> Result<Option<ChatMessage>, TransportError>;

    fn name(&self) -> &str {
        "transport"
    }
}
