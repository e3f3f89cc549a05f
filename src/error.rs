//! Error types for the orchestration layer.
//!

use crate::config::ConfigurationError;
use crate::coordination::CoordinationError;
use crate::executor::ExecutorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Coordination store error: {0}")]
    Coordination(#[from] CoordinationError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The beat lock expired or was taken over while the holder was still working
    #[error("Lock lost: {lock} is no longer owned by this holder")]
    LockLost { lock: String },

    #[error("Relational store error: {operation} - {message}")]
    Relational { operation: String, message: String },

    #[error("Invalid fence at {key}: {message}")]
    InvalidFence { key: String, message: String },

    #[error("Indexing supervisor error for attempt {attempt_id}: {message}")]
    Supervisor { attempt_id: i64, message: String },

    /// A driver stopped because its termination flag was set
    #[error("Driver {driver_task_id} was asked to terminate")]
    Terminated { driver_task_id: String },

    #[error("Failed to spawn indexing job: {0}")]
    Spawn(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No handler registered for task: {0}")]
    UnknownTask(String),

    #[error("Invalid work unit arguments: {0}")]
    InvalidArguments(String),
}

impl OrchestrationError {
    pub fn relational(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Relational {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn invalid_fence(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFence {
            key: key.into(),
            message: message.into(),
        }
    }

    pub fn lock_lost(lock: impl Into<String>) -> Self {
        Self::LockLost { lock: lock.into() }
    }

    /// Whether the error means the caller no longer holds its beat lock
    pub fn is_lock_lost(&self) -> bool {
        matches!(self, Self::LockLost { .. })
    }
}

impl From<serde_json::Error> for OrchestrationError {
    fn from(error: serde_json::Error) -> Self {
        OrchestrationError::Serialization(format!("JSON serialization error: {error}"))
    }
}

pub type OrchestrationResult<T> = anyhow::Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_lost_detection() {
        let err = OrchestrationError::lock_lost("beat_lock:monitor_campaigns_beat");
        assert!(err.is_lock_lost());
        assert!(err.to_string().contains("monitor_campaigns_beat"));

        let other = OrchestrationError::relational("mark_document_set_synced", "timeout");
        assert!(!other.is_lock_lost());
    }

    #[test]
    fn test_coordination_error_conversion() {
        let err: OrchestrationError = CoordinationError::BackendError("SCARD failed".into()).into();
        assert!(matches!(err, OrchestrationError::Coordination(_)));
    }
}
