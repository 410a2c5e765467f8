//! Newline-delimited chat source, one message per line. Used for replaying
//! captured chat logs and for piping chat in on stdin.

use async_trait::async_trait;
use log::warn;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{self, Duration, Instant};

use super::{ChatMessage, ChatTransport, TransportError};
use crate::utils::time::deadline_after;

pub struct LineTransport<R> {
    reader: R,
    // bytes of the line being read; survives a receive timeout
    pending: Vec<u8>,
    name: String,
}

impl<R: AsyncBufRead + Unpin + Send> LineTransport<R> {
    pub fn new(reader: R, name: impl Into<String>) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            name: name.into(),
        }
    }
}

impl LineTransport<tokio::io::BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), "stdin")
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> ChatTransport for LineTransport<R> {
    async fn receive(&mut self, timeout: Duration) -> Result<Option<ChatMessage>, TransportError> {
        let deadline = deadline_after(timeout);
        loop {
            let line_read = self.reader.read_until(b'\n', &mut self.pending);
            let read = time::timeout_at(deadline, line_read).await;
            match read {
                Err(_) => return Ok(None),
                Ok(Err(err)) => return Err(TransportError::Fatal(err.to_string())),
                Ok(Ok(0)) if self.pending.is_empty() => return Err(TransportError::Closed),
                Ok(Ok(_)) => {}
            }

            let bytes = std::mem::take(&mut self.pending);
            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(err) => {
                    warn!(
                        "{}: skipping line with invalid UTF-8 ({} bytes)",
                        self.name,
                        err.as_bytes().len()
                    );
                    continue;
                }
            };

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            return Ok(Some(ChatMessage::new(text, Instant::now())));
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
