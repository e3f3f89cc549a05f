//! In-memory task executor
//!
//! Single-process stand-in for the worker pool. Submissions land on named
//! queues; the worker-side transitions (`reserve_next`, `start`, `finish`,
//! `lose`) are driven explicitly by tests or a local runner, so every
//! introspection gap the watchdog has to tolerate can be reproduced.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{ExecutorError, ExecutorResult, TaskExecutor, TaskSubmission};

#[derive(Debug, Default)]
struct ExecutorState {
    queues: HashMap<String, Vec<TaskSubmission>>,
    reserved: HashMap<String, (String, TaskSubmission)>,
    active: HashMap<String, (String, TaskSubmission)>,
    history: Vec<TaskSubmission>,
    known_queues: Option<HashSet<String>>,
    reject_submissions: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryTaskExecutor {
    state: Mutex<ExecutorState>,
}

impl InMemoryTaskExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict submissions to the named queues
    pub fn with_queues(queues: &[&str]) -> Self {
        let executor = Self::default();
        executor.state.lock().known_queues =
            Some(queues.iter().map(|queue| queue.to_string()).collect());
        executor
    }

    /// Make every subsequent `submit` fail (for testing)
    pub fn set_reject_submissions(&self, reject: bool) {
        self.state.lock().reject_submissions = reject;
    }

    /// Move the highest-priority queued task (FIFO within a priority) to reserved
    pub fn reserve_next(&self, queue: &str, worker: &str) -> Option<TaskSubmission> {
        let mut state = self.state.lock();
        let pending = state.queues.get_mut(queue)?;
        let position = pending
            .iter()
            .enumerate()
            .min_by_key(|(index, task)| (task.priority, *index))
            .map(|(index, _)| index)?;
        let task = pending.remove(position);
        state
            .reserved
            .insert(task.task_id.clone(), (worker.to_string(), task.clone()));
        debug!(task_id = %task.task_id, queue = queue, worker = worker, "Task reserved");
        Some(task)
    }

    /// Reserved -> active
    pub fn start(&self, task_id: &str) -> bool {
        let mut state = self.state.lock();
        match state.reserved.remove(task_id) {
            Some(entry) => {
                state.active.insert(task_id.to_string(), entry);
                true
            }
            None => false,
        }
    }

    /// Task ran to an end; it leaves the reserved/active lists
    pub fn finish(&self, task_id: &str) -> bool {
        let mut state = self.state.lock();
        state.active.remove(task_id).is_some() || state.reserved.remove(task_id).is_some()
    }

    /// Simulate a killed worker: the task disappears from every list
    pub fn lose(&self, task_id: &str) -> bool {
        let mut state = self.state.lock();
        let mut found = state.active.remove(task_id).is_some();
        found |= state.reserved.remove(task_id).is_some();
        for pending in state.queues.values_mut() {
            let before = pending.len();
            pending.retain(|task| task.task_id != task_id);
            found |= pending.len() != before;
        }
        found
    }

    pub fn queued_len(&self, queue: &str) -> usize {
        self.state
            .lock()
            .queues
            .get(queue)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Every submission accepted so far, in order
    pub fn submissions(&self) -> Vec<TaskSubmission> {
        self.state.lock().history.clone()
    }

    pub fn submissions_named(&self, task_name: &str) -> Vec<TaskSubmission> {
        self.state
            .lock()
            .history
            .iter()
            .filter(|task| task.task_name == task_name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TaskExecutor for InMemoryTaskExecutor {
    async fn submit(&self, submission: TaskSubmission) -> ExecutorResult<String> {
        let mut state = self.state.lock();
        if state.reject_submissions {
            return Err(ExecutorError::SubmissionFailed {
                task_name: submission.task_name,
                queue: submission.queue,
                message: "executor is rejecting submissions".to_string(),
            });
        }
        if let Some(known) = &state.known_queues {
            if !known.contains(&submission.queue) {
                return Err(ExecutorError::QueueNotFound(submission.queue));
            }
        }

        let task_id = submission.task_id.clone();
        debug!(
            task_id = %task_id,
            task_name = %submission.task_name,
            queue = %submission.queue,
            priority = %submission.priority,
            "Task submitted"
        );
        state.history.push(submission.clone());
        state
            .queues
            .entry(submission.queue.clone())
            .or_default()
            .push(submission);
        Ok(task_id)
    }

    async fn queued_task_ids(&self, queue: &str) -> ExecutorResult<HashSet<String>> {
        Ok(self
            .state
            .lock()
            .queues
            .get(queue)
            .map(|pending| pending.iter().map(|task| task.task_id.clone()).collect())
            .unwrap_or_default())
    }

    async fn reserved_task_ids(&self) -> ExecutorResult<HashSet<String>> {
        Ok(self.state.lock().reserved.keys().cloned().collect())
    }

    async fn active_task_ids(&self) -> ExecutorResult<HashSet<String>> {
        Ok(self.state.lock().active.keys().cloned().collect())
    }
}
