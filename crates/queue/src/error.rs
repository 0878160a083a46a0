//! Queue, sink and cycle error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use flowbatch_core::ConfigError;

/// Failure while reading the shared queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,

    #[error("queue access error: {0}")]
    Access(String),
}

/// Failure reported by the downstream batch sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("batch rejected: {0}")]
    Rejected(String),
}

/// Anything that can fail inside one polling cycle.
///
/// Never escapes [`PollableSource::process`](crate::source::PollableSource::process);
/// it is recorded by the counter and logged instead.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("cannot transform message {message_id}: {reason}")]
    Transform { message_id: String, reason: String },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("downstream error: {0}")]
    Downstream(#[from] SinkError),
}

impl CycleError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CycleError::Transform { .. } => FailureKind::Transform,
            CycleError::Queue(_) => FailureKind::Queue,
            CycleError::Downstream(_) => FailureKind::Downstream,
        }
    }
}

/// Coarse failure category, tracked separately by the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transform,
    Queue,
    Downstream,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Transform => "transform",
            FailureKind::Queue => "queue",
            FailureKind::Downstream => "downstream",
        };
        f.write_str(s)
    }
}

/// Lifecycle misuse of a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("source is running; stop it before reconfiguring")]
    Running,
}
