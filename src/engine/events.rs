use serde::Serialize;
use tokio::sync::broadcast;

use crate::recorder::BackendOp;

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Operator-facing notifications. Delivery is best effort; a subscriber that
/// falls behind skips events rather than slowing the engine down.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    ClipStarted {
        session_id: String,
    },
    ClipStopped {
        session_id: String,
        duration_ms: u64,
    },
    BackendRetry {
        op: BackendOp,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// A backend call ran out of retries.
    BackendFailed {
        op: BackendOp,
        attempts: u32,
        error: String,
    },
}

pub fn event_channel() -> broadcast::Sender<EngineEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}
