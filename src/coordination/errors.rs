//! Coordination store error types

use thiserror::Error;

/// Errors that can occur while talking to the coordination store
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// Failed to connect to the store backend
    #[error("Coordination store connection error: {0}")]
    ConnectionError(String),

    /// A command was rejected or failed on the backend
    #[error("Coordination store backend error: {0}")]
    BackendError(String),

    /// A stored value could not be decoded
    #[error("Coordination store serialization error: {0}")]
    SerializationError(String),

    /// The operation did not complete in time
    #[error("Coordination store operation timed out: {0}")]
    Timeout(String),
}

/// Result type for coordination store operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;
