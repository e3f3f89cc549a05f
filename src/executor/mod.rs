//! # Task Executor
//!
//! Abstraction over the distributed work queue that runs campaign work units
//! and driver tasks. The orchestration layer only ever submits named tasks
//! with explicit ids and inspects which ids are still queued, reserved by a
//! worker, or actively executing.

pub mod in_memory;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use in_memory::InMemoryTaskExecutor;

use crate::constants::TaskPriority;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Failed to submit {task_name} to queue {queue}: {message}")]
    SubmissionFailed {
        task_name: String,
        queue: String,
        message: String,
    },

    #[error("Executor inspection failed: {message}")]
    InspectionFailed { message: String },

    #[error("Queue not found: {0}")]
    QueueNotFound(String),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// One named unit of work bound for a queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub task_name: String,
    pub args: serde_json::Value,
    pub queue: String,
    pub task_id: String,
    pub priority: TaskPriority,
}

impl TaskSubmission {
    /// New submission with a fresh uuid task id and medium priority
    pub fn new(
        task_name: impl Into<String>,
        queue: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self {
            task_name: task_name.into(),
            args,
            queue: queue.into(),
            task_id: Uuid::new_v4().to_string(),
            priority: TaskPriority::default(),
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
pub trait TaskExecutor: Send + Sync + std::fmt::Debug + 'static {
    /// Enqueue a task under its explicit id and return that id
    async fn submit(&self, submission: TaskSubmission) -> ExecutorResult<String>;

    /// Ids waiting on `queue` that no worker has picked up yet
    async fn queued_task_ids(&self, queue: &str) -> ExecutorResult<HashSet<String>>;

    /// Ids prefetched by any worker but not yet executing
    async fn reserved_task_ids(&self) -> ExecutorResult<HashSet<String>>;

    /// Ids currently executing on any worker
    async fn active_task_ids(&self) -> ExecutorResult<HashSet<String>>;

    /// Whether the executor knows `task_id` in any state
    async fn is_task_known(&self, queue: &str, task_id: &str) -> ExecutorResult<bool> {
        Ok(self.queued_task_ids(queue).await?.contains(task_id)
            || self.reserved_task_ids().await?.contains(task_id)
            || self.active_task_ids().await?.contains(task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_builder() {
        let submission = TaskSubmission::new(
            "document_metadata_sync_task",
            "vespa_metadata_sync",
            serde_json::json!({ "document_id": "doc-1" }),
        )
        .with_task_id("fixed")
        .with_priority(TaskPriority::Low);

        assert_eq!(submission.task_id, "fixed");
        assert_eq!(submission.priority, TaskPriority::Low);
        assert_eq!(submission.args["document_id"], "doc-1");
    }

    #[test]
    fn test_default_ids_are_unique() {
        let a = TaskSubmission::new("t", "q", serde_json::Value::Null);
        let b = TaskSubmission::new("t", "q", serde_json::Value::Null);
        assert_ne!(a.task_id, b.task_id);
    }
}
