//! Recording control
//!
//! The controller wraps a remote recording backend in a state machine that
//! never holds more than one session open and retries failed calls with a
//! fixed backoff.

pub mod backend;
pub mod command;
pub mod controller;
pub mod state;

pub use backend::{BackendOp, ConnectionError, DryRunBackend, RecordingBackend};
pub use command::CommandBackend;
pub use controller::{RecorderError, RecordingController, RetryPolicy, Transition};
pub use state::{RecordingSession, RecordingState, SessionSnapshot};
