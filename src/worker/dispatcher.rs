//! # Work Unit Dispatch
//!
//! Worker-side execution of the tasks the generators and scheduler submit.
//!
//! ```text
//! TaskSubmission ──→ WorkUnitDispatcher ──→ WorkUnitHandler (by task name)
//!                          │
//!                          └── post-run: remove task id from the campaign's task set
//!                              (terminal outcomes only)
//! ```
//!
//! Removing the id is the dispatcher's job, not the handler's, so every work
//! unit reports completion the same way regardless of what it did. A
//! `Retry` outcome keeps the id in the set and resubmits the same task id
//! until the retry budget is spent, after which the unit counts as failed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::campaign::{CampaignFence, CampaignRef};
use crate::coordination::CoordinationStore;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::executor::{TaskExecutor, TaskSubmission};

/// Argument key the dispatcher uses to count retries of one task id
const RETRIES_ARG: &str = "retries";

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Terminal or retryable result of one work unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed { reason: String },
    Retry { reason: String },
}

impl TaskOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retry {
            reason: reason.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Retry { .. })
    }
}

/// A task as seen by its handler
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    pub task_id: String,
    pub task_name: String,
    pub args: serde_json::Value,
    pub retries: u32,
}

impl WorkUnit {
    pub fn from_submission(submission: &TaskSubmission) -> Self {
        let retries = submission
            .args
            .get(RETRIES_ARG)
            .and_then(serde_json::Value::as_u64)
            .map_or(0, |retries| u32::try_from(retries).unwrap_or(u32::MAX));
        Self {
            task_id: submission.task_id.clone(),
            task_name: submission.task_name.clone(),
            args: submission.args.clone(),
            retries,
        }
    }

    /// Campaign this unit belongs to; driver tasks carry none
    pub fn campaign(&self) -> Option<CampaignRef> {
        self.args
            .get("campaign")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn document_id(&self) -> OrchestrationResult<&str> {
        self.args
            .get("document_id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                OrchestrationError::InvalidArguments(format!(
                    "{} ({}) carries no document_id",
                    self.task_name, self.task_id
                ))
            })
    }

    /// Deserialize the whole argument object
    pub fn parse_args<T: DeserializeOwned>(&self) -> OrchestrationResult<T> {
        serde_json::from_value(self.args.clone()).map_err(|e| {
            OrchestrationError::InvalidArguments(format!(
                "{} ({}): {e}",
                self.task_name, self.task_id
            ))
        })
    }
}

#[async_trait]
pub trait WorkUnitHandler: Send + Sync + std::fmt::Debug + 'static {
    /// Executor task name this handler serves
    fn task_name(&self) -> &str;

    /// Run the unit. An `Err` is recorded as a failed unit.
    async fn handle(&self, unit: &WorkUnit) -> OrchestrationResult<TaskOutcome>;
}

#[derive(Debug, Clone)]
pub struct WorkUnitDispatcher {
    store: Arc<dyn CoordinationStore>,
    executor: Arc<dyn TaskExecutor>,
    handlers: HashMap<String, Arc<dyn WorkUnitHandler>>,
    max_retries: u32,
}

impl WorkUnitDispatcher {
    pub fn new(store: Arc<dyn CoordinationStore>, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            store,
            executor,
            handlers: HashMap::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn register(&mut self, handler: Arc<dyn WorkUnitHandler>) {
        self.handlers.insert(handler.task_name().to_string(), handler);
    }

    pub fn handles(&self, task_name: &str) -> bool {
        self.handlers.contains_key(task_name)
    }

    /// Run one submission and apply the post-run bookkeeping.
    ///
    /// A task nobody handles, or a retry that cannot be resubmitted, ends as
    /// `Failed` so its id still leaves the task set.
    #[instrument(skip(self, submission), fields(task_name = %submission.task_name, task_id = %submission.task_id))]
    pub async fn dispatch(&self, submission: &TaskSubmission) -> OrchestrationResult<TaskOutcome> {
        let unit = WorkUnit::from_submission(submission);
        let Some(handler) = self.handlers.get(&submission.task_name) else {
            let e = OrchestrationError::UnknownTask(submission.task_name.clone());
            warn!(error = %e, "No handler registered");
            self.on_terminal(&unit).await?;
            return Ok(TaskOutcome::failed(e.to_string()));
        };

        let mut outcome = match handler.handle(&unit).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Work unit failed");
                TaskOutcome::failed(e.to_string())
            }
        };

        if let TaskOutcome::Retry { reason } = &outcome {
            if unit.retries >= self.max_retries {
                warn!(retries = unit.retries, reason = %reason, "Retry budget exhausted");
                outcome = TaskOutcome::failed(format!("retries exhausted: {reason}"));
            } else {
                match self.resubmit(submission, unit.retries + 1).await {
                    Ok(()) => {
                        debug!(retries = unit.retries + 1, reason = %reason, "Work unit resubmitted");
                        return Ok(outcome);
                    }
                    Err(e) => {
                        warn!(error = %e, reason = %reason, "Retry could not be resubmitted");
                        outcome = TaskOutcome::failed(format!("resubmission failed: {e}"));
                    }
                }
            }
        }

        self.on_terminal(&unit).await?;
        Ok(outcome)
    }

    async fn on_terminal(&self, unit: &WorkUnit) -> OrchestrationResult<()> {
        let Some(campaign) = unit.campaign() else {
            return Ok(());
        };
        let fence = CampaignFence::new(self.store.clone(), campaign.kind, campaign.resource_id);
        if !fence.complete_task(&unit.task_id).await? {
            debug!(kind = %campaign.kind, resource_id = campaign.resource_id, "Task id already absent from task set");
        }
        Ok(())
    }

    async fn resubmit(&self, submission: &TaskSubmission, retries: u32) -> OrchestrationResult<()> {
        let mut retry = submission.clone();
        if let Some(args) = retry.args.as_object_mut() {
            args.insert(RETRIES_ARG.to_string(), serde_json::Value::from(retries));
        }
        self.executor.submit(retry).await?;
        Ok(())
    }
}
