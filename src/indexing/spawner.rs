//! # Job Spawning
//!
//! The indexing supervisor runs the actual indexing work as a separate
//! process so the work survives independently of the supervising worker's
//! own lifecycle and signal handling. [`JobSpawner`] is the seam; the
//! production implementation is [`ProcessSpawner`].

use std::collections::BTreeMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::collaborators::CcPairId;
use crate::config::IndexingConfig;
use crate::error::{OrchestrationError, OrchestrationResult};

pub const ENV_INDEX_ATTEMPT_ID: &str = "DOCSYNC_INDEX_ATTEMPT_ID";
pub const ENV_CC_PAIR_ID: &str = "DOCSYNC_CC_PAIR_ID";
pub const ENV_TENANT_ID: &str = "DOCSYNC_TENANT_ID";
pub const ENV_DRIVER_TASK_ID: &str = "DOCSYNC_DRIVER_TASK_ID";

/// What the spawned job needs to know about its run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub cc_pair_id: CcPairId,
    pub attempt_id: i64,
    pub driver_task_id: String,
    pub tenant_id: Option<String>,
}

impl JobRequest {
    /// Environment handed to the child
    pub fn environment(&self) -> BTreeMap<&'static str, String> {
        let mut env = BTreeMap::new();
        env.insert(ENV_INDEX_ATTEMPT_ID, self.attempt_id.to_string());
        env.insert(ENV_CC_PAIR_ID, self.cc_pair_id.to_string());
        env.insert(ENV_DRIVER_TASK_ID, self.driver_task_id.clone());
        if let Some(tenant) = &self.tenant_id {
            env.insert(ENV_TENANT_ID, tenant.clone());
        }
        env
    }
}

/// How a job ended. `code` is `None` when it was killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobExit {
    pub code: Option<i32>,
}

impl JobExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub trait SpawnedJob: Send + std::fmt::Debug {
    /// Exit status if the job has ended; never blocks
    fn try_wait(&mut self) -> OrchestrationResult<Option<JobExit>>;

    /// Stop the job and wait for it to exit
    async fn terminate(&mut self) -> OrchestrationResult<()>;
}

#[async_trait]
pub trait JobSpawner: Send + Sync + std::fmt::Debug + 'static {
    async fn spawn(&self, request: &JobRequest) -> OrchestrationResult<Box<dyn SpawnedJob>>;
}

/// Launches `indexing.program` with `indexing.args`
#[derive(Debug, Clone)]
pub struct ProcessSpawner {
    program: String,
    args: Vec<String>,
}

impl ProcessSpawner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &IndexingConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

#[async_trait]
impl JobSpawner for ProcessSpawner {
    async fn spawn(&self, request: &JobRequest) -> OrchestrationResult<Box<dyn SpawnedJob>> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .envs(request.environment())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OrchestrationError::Spawn(format!("{}: {e}", self.program)))?;

        info!(
            program = %self.program,
            pid = child.id(),
            cc_pair_id = request.cc_pair_id,
            attempt_id = request.attempt_id,
            "Indexing process spawned"
        );
        Ok(Box::new(ProcessJob { child }))
    }
}

#[derive(Debug)]
pub struct ProcessJob {
    child: Child,
}

#[async_trait]
impl SpawnedJob for ProcessJob {
    fn try_wait(&mut self) -> OrchestrationResult<Option<JobExit>> {
        self.child
            .try_wait()
            .map(|status| status.map(|status| JobExit { code: status.code() }))
            .map_err(|e| OrchestrationError::Spawn(format!("failed to poll child: {e}")))
    }

    async fn terminate(&mut self) -> OrchestrationResult<()> {
        debug!(pid = self.child.id(), "Terminating indexing process");
        self.child
            .kill()
            .await
            .map_err(|e| OrchestrationError::Spawn(format!("failed to kill child: {e}")))
    }
}
