//! Error types for the craftlink protocol.

use thiserror::Error;

/// Errors surfaced by collaborators and protocol-level operations.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid batch: {0}")]
    Validation(#[from] BatchValidationError),
    #[error("world error: {0}")]
    World(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<serde_json::Error> for LinkError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Reasons an [`EventBatch`](crate::event::EventBatch) is refused before any
/// network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchValidationError {
    #[error("session id is empty")]
    EmptySessionId,
    #[error("batch has no events")]
    NoEvents,
    #[error("event {index} has an empty timestamp")]
    MissingTimestamp { index: usize },
    #[error("event {index} has a null payload")]
    MissingPayload { index: usize },
    #[error("event {index} is typed {declared} but carries a {actual} payload")]
    PayloadMismatch {
        index: usize,
        declared: &'static str,
        actual: &'static str,
    },
}

/// Convenience result type for protocol operations.
pub type LinkResult<T> = Result<T, LinkError>;
