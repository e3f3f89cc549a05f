//! # Indexing Supervisor
//!
//! Body of the indexing driver task. The supervisor claims the campaign
//! fence, spawns the indexing job as a separate process and polls it every
//! `indexing.poll_interval_seconds` until one of:
//!
//! - the termination key for this driver appears: the job is stopped, the
//!   attempt is marked canceled and the failure code is written
//! - the job exits: the exit code decides success (see below) and the
//!   matching completion code is written
//! - the loop itself fails: the job is stopped and the attempt is marked
//!   failed with the captured reason
//!
//! A zero exit is success. A non-zero exit is failure, unless
//! `indexing.tolerate_nonzero_exit_with_completion` is set and the job wrote
//! the OK completion code before exiting.
//!
//! On success the attempt is left in progress; the monitor marks it succeeded
//! when it finalizes the drained campaign.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::{debug, error, info, instrument, warn};

use super::spawner::{JobExit, JobRequest, JobSpawner, SpawnedJob};
use crate::campaign::{CampaignFence, CampaignKind};
use crate::collaborators::{CcPairId, RelationalStore};
use crate::config::IndexingConfig;
use crate::constants::completion;
use crate::coordination::CoordinationStore;
use crate::error::OrchestrationResult;
use crate::metrics;
use crate::orchestration::Generator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexingRunOutcome {
    Succeeded,
    Failed { reason: String },
    Canceled,
}

impl IndexingRunOutcome {
    fn label(&self) -> &'static str {
        match self {
            IndexingRunOutcome::Succeeded => "succeeded",
            IndexingRunOutcome::Failed { .. } => "failed",
            IndexingRunOutcome::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexingSupervisor {
    store: Arc<dyn CoordinationStore>,
    relational: Arc<dyn RelationalStore>,
    spawner: Arc<dyn JobSpawner>,
    generator: Generator,
    config: IndexingConfig,
    liveness_ttl: Duration,
    tenant_id: Option<String>,
}

impl IndexingSupervisor {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        relational: Arc<dyn RelationalStore>,
        spawner: Arc<dyn JobSpawner>,
        generator: Generator,
        config: IndexingConfig,
        liveness_ttl: Duration,
    ) -> Self {
        Self {
            store,
            relational,
            spawner,
            generator,
            config,
            liveness_ttl,
            tenant_id: None,
        }
    }

    /// Tenant handed to the spawned job
    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    #[instrument(skip(self))]
    pub async fn run(
        &self,
        cc_pair_id: CcPairId,
        attempt_id: i64,
        driver_task_id: &str,
    ) -> OrchestrationResult<IndexingRunOutcome> {
        let fence = CampaignFence::new(self.store.clone(), CampaignKind::ConnectorIndexing, cc_pair_id);

        // A missing or foreign fence means the watchdog already gave up on
        // this driver; the attempt is no longer ours to touch.
        if let Err(e) = self.generator.claim_driver(&fence, driver_task_id, Some(0)).await {
            warn!(cc_pair_id = cc_pair_id, attempt_id = attempt_id, error = %e, "Indexing driver could not claim its fence");
            let outcome = IndexingRunOutcome::Failed {
                reason: e.to_string(),
            };
            self.record(&outcome);
            return Ok(outcome);
        }

        let mut job = None;
        let supervised = self
            .supervise(&fence, cc_pair_id, attempt_id, driver_task_id, &mut job)
            .await;

        let outcome = match supervised {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(cc_pair_id = cc_pair_id, attempt_id = attempt_id, error = %e, "Indexing supervisor failed");
                if let Some(job) = job.as_mut() {
                    if let Err(kill_error) = job.terminate().await {
                        warn!(error = %kill_error, "Failed to stop indexing job after supervisor error");
                    }
                }
                let reason = format!("indexing supervisor failed: {e}");
                self.fail(&fence, attempt_id, driver_task_id, &reason).await?;
                IndexingRunOutcome::Failed { reason }
            }
        };

        self.record(&outcome);
        Ok(outcome)
    }

    async fn supervise(
        &self,
        fence: &CampaignFence,
        cc_pair_id: CcPairId,
        attempt_id: i64,
        driver_task_id: &str,
        job: &mut Option<Box<dyn SpawnedJob>>,
    ) -> OrchestrationResult<IndexingRunOutcome> {
        self.relational.mark_attempt_in_progress(attempt_id).await?;

        let request = JobRequest {
            cc_pair_id,
            attempt_id,
            driver_task_id: driver_task_id.to_string(),
            tenant_id: self.tenant_id.clone(),
        };
        let running = job.insert(self.spawner.spawn(&request).await?);

        loop {
            tokio::time::sleep(self.config.poll_interval()).await;
            fence.set_active(self.liveness_ttl).await?;

            if fence.is_terminating(driver_task_id).await? {
                info!(cc_pair_id = cc_pair_id, attempt_id = attempt_id, "Termination requested; canceling indexing run");
                self.relational
                    .mark_attempt_canceled(attempt_id, "termination requested")
                    .await?;
                running.terminate().await?;
                self.signal(fence, driver_task_id, completion::FAILED).await?;
                fence.clear_termination(driver_task_id).await?;
                return Ok(IndexingRunOutcome::Canceled);
            }

            if let Some(exit) = running.try_wait()? {
                return self.conclude(fence, attempt_id, driver_task_id, exit).await;
            }
            debug!(cc_pair_id = cc_pair_id, attempt_id = attempt_id, "Indexing job still running");
        }
    }

    async fn conclude(
        &self,
        fence: &CampaignFence,
        attempt_id: i64,
        driver_task_id: &str,
        exit: JobExit,
    ) -> OrchestrationResult<IndexingRunOutcome> {
        let reported = fence.generator_complete().await?;

        if exit.success() {
            if reported.is_some_and(|code| !completion::is_ok(code)) {
                warn!(attempt_id = attempt_id, reported = ?reported, "Job exited cleanly but reported failure; exit code wins");
            }
            self.signal(fence, driver_task_id, completion::OK).await?;
            info!(attempt_id = attempt_id, "Indexing job completed");
            return Ok(IndexingRunOutcome::Succeeded);
        }

        if self.config.tolerate_nonzero_exit_with_completion
            && reported.is_some_and(completion::is_ok)
        {
            warn!(attempt_id = attempt_id, code = ?exit.code, "Tolerating non-zero exit after OK completion signal");
            return Ok(IndexingRunOutcome::Succeeded);
        }

        let mut reason = match exit.code {
            Some(code) => format!("indexing job exited with code {code}"),
            None => "indexing job was killed by a signal".to_string(),
        };
        if let Some(code) = reported {
            reason.push_str(&format!(" (reported completion {code})"));
        }
        self.fail(fence, attempt_id, driver_task_id, &reason).await?;
        Ok(IndexingRunOutcome::Failed { reason })
    }

    /// Failure code first: a monitor beat can then finalize the attempt even if
    /// the status write below fails.
    async fn fail(
        &self,
        fence: &CampaignFence,
        attempt_id: i64,
        driver_task_id: &str,
        reason: &str,
    ) -> OrchestrationResult<()> {
        self.signal(fence, driver_task_id, completion::FAILED).await?;
        self.relational.mark_attempt_failed(attempt_id, reason).await?;
        warn!(attempt_id = attempt_id, reason = reason, "Indexing attempt failed");
        Ok(())
    }

    /// Completion code for a fence this driver still owns; a reset fence may
    /// already belong to the next campaign and is left alone.
    async fn signal(&self, fence: &CampaignFence, driver_task_id: &str, code: i64) -> OrchestrationResult<()> {
        if !fence.finish_as(driver_task_id, None, code).await? {
            warn!(resource_id = fence.resource_id(), driver_task_id = driver_task_id, code = code, "Fence no longer owned; completion not written");
        }
        Ok(())
    }

    fn record(&self, outcome: &IndexingRunOutcome) {
        metrics::indexing_runs_total().add(1, &[KeyValue::new("outcome", outcome.label())]);
    }
}
