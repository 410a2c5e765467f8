use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use serde::Serialize;
use thiserror::Error;

/// Failure talking to the recording backend. Every variant is retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("recording backend unreachable: {0}")]
    Unreachable(String),

    #[error("recording backend call timed out after {0:?}")]
    Timeout(Duration),

    #[error("recording backend rejected the request: {0}")]
    Rejected(String),
}

/// Remote recorder driven by the controller. Calls are made one at a time.
#[async_trait]
pub trait RecordingBackend: Send + Sync {
    async fn begin(&self) -> Result<(), ConnectionError>;

    async fn end(&self) -> Result<(), ConnectionError>;

    fn name(&self) -> &str {
        "backend"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendOp {
    Begin,
    End,
}

impl fmt::Display for BackendOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendOp::Begin => f.write_str("begin"),
            BackendOp::End => f.write_str("end"),
        }
    }
}

/// Logs instead of recording. Used for `--dry-run`.
#[derive(Debug, Default)]
pub struct DryRunBackend;

#[async_trait]
impl RecordingBackend for DryRunBackend {
    async fn begin(&self) -> Result<(), ConnectionError> {
        info!("[dry-run] begin recording");
        Ok(())
    }

    async fn end(&self) -> Result<(), ConnectionError> {
        info!("[dry-run] end recording");
        Ok(())
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}
