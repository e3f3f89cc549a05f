//! # Campaign Scheduler
//!
//! The periodic "should this resource get a new campaign?" pass. Each kind
//! is checked under its own `check_for_{prefix}` beat lock, so one slow kind
//! never delays another and two schedulers never generate the same kind at
//! once.
//!
//! Kinds that conflict on a resource (deletion versus pruning/indexing) are
//! kept apart here: a resource with a live fence of a blocking kind is
//! skipped, and a blocking driver is asked to terminate so the deletion can
//! proceed on a later pass.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::{debug, error, info, instrument, warn};

use super::generator::Generator;
use super::registry::CampaignRegistry;
use crate::campaign::{Campaign, CampaignFence, CampaignKind, ResourceId};
use crate::config::SchedulingConfig;
use crate::coordination::{BeatLock, CoordinationStore};
use crate::error::OrchestrationResult;
use crate::metrics;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulingReport {
    /// Kinds skipped because another scheduler held their lock
    pub kinds_skipped: u64,
    pub considered: u64,
    /// Campaigns whose fence was armed or whose driver was submitted
    pub started: u64,
    pub work_units: u64,
    /// Resources already owned by a campaign of the same kind
    pub already_running: u64,
    /// Resources held by a blocking kind
    pub blocked: u64,
    pub errors: u64,
}

#[derive(Debug, Clone)]
pub struct CampaignScheduler {
    store: Arc<dyn CoordinationStore>,
    registry: Arc<CampaignRegistry>,
    generator: Generator,
    config: SchedulingConfig,
    termination_ttl: Duration,
}

impl CampaignScheduler {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        registry: Arc<CampaignRegistry>,
        generator: Generator,
        config: SchedulingConfig,
        termination_ttl: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            generator,
            config,
            termination_ttl,
        }
    }

    pub fn lock_name(kind: CampaignKind) -> String {
        format!("check_for_{}", kind.key_prefix())
    }

    #[instrument(skip(self))]
    pub async fn run_pass(&self) -> OrchestrationResult<SchedulingReport> {
        let mut report = SchedulingReport::default();

        for campaign in self.registry.campaigns() {
            let kind = campaign.kind();
            let lock_name = Self::lock_name(kind);
            let Some(lock) =
                BeatLock::try_acquire(self.store.clone(), &lock_name, self.config.lock_timeout())
                    .await?
            else {
                metrics::beats_skipped_total().add(1, &[KeyValue::new("lock", lock_name)]);
                report.kinds_skipped += 1;
                continue;
            };

            let outcome = self.schedule_kind(campaign.as_ref(), &lock, &mut report).await;
            if let Err(e) = lock.release().await {
                warn!(kind = %kind, error = %e, "Failed to release scheduling lock");
            }
            if let Err(e) = outcome {
                // Lost lock: another scheduler now owns this kind
                error!(kind = %kind, error = %e, "Scheduling aborted for kind");
                report.errors += 1;
            }
        }

        if report.started > 0 || report.errors > 0 {
            info!(
                started = report.started,
                work_units = report.work_units,
                blocked = report.blocked,
                errors = report.errors,
                "Scheduling pass completed"
            );
        }
        Ok(report)
    }

    async fn schedule_kind(
        &self,
        campaign: &dyn Campaign,
        lock: &BeatLock,
        report: &mut SchedulingReport,
    ) -> OrchestrationResult<()> {
        let kind = campaign.kind();
        let resources = match campaign.resources_due().await {
            Ok(resources) => resources,
            Err(e) => {
                error!(kind = %kind, error = %e, "Failed to enumerate resources due");
                report.errors += 1;
                return Ok(());
            }
        };

        for resource_id in resources {
            lock.reacquire().await?;
            report.considered += 1;

            match self.schedule_resource(campaign, resource_id).await {
                Ok(ScheduleOutcome::Started { work_units }) => {
                    report.started += 1;
                    report.work_units += work_units;
                }
                Ok(ScheduleOutcome::NothingToDo) => {}
                Ok(ScheduleOutcome::AlreadyRunning) => report.already_running += 1,
                Ok(ScheduleOutcome::Blocked) => report.blocked += 1,
                Err(e) => {
                    error!(kind = %kind, resource_id = resource_id, error = %e, "Failed to start campaign");
                    report.errors += 1;
                }
            }
        }
        Ok(())
    }

    async fn schedule_resource(
        &self,
        campaign: &dyn Campaign,
        resource_id: ResourceId,
    ) -> OrchestrationResult<ScheduleOutcome> {
        let kind = campaign.kind();
        if self.blocked(kind, resource_id).await? {
            return Ok(ScheduleOutcome::Blocked);
        }

        if kind.has_driver() {
            return Ok(match self.generator.dispatch_driver(campaign, resource_id).await? {
                Some(_) => ScheduleOutcome::Started { work_units: 0 },
                None => ScheduleOutcome::AlreadyRunning,
            });
        }

        Ok(match self.generator.try_generate(campaign, resource_id).await? {
            Some(0) if !kind.arms_when_empty() => ScheduleOutcome::NothingToDo,
            Some(work_units) => ScheduleOutcome::Started { work_units },
            None => ScheduleOutcome::AlreadyRunning,
        })
    }

    /// Whether a blocking kind holds the resource; asks its driver to stop
    async fn blocked(&self, kind: CampaignKind, resource_id: ResourceId) -> OrchestrationResult<bool> {
        let mut blocked = false;
        for blocker in kind.blocked_by() {
            let fence = CampaignFence::new(self.store.clone(), *blocker, resource_id);
            let Some(value) = fence.read().await? else {
                continue;
            };
            blocked = true;

            // Only deletion preempts; pruning and indexing simply wait it out
            if kind != CampaignKind::ConnectorDeletion {
                continue;
            }
            if let Some(driver_task_id) = value
                .payload()
                .and_then(|payload| payload.executor_task_id.as_deref())
            {
                fence
                    .request_termination(driver_task_id, self.termination_ttl)
                    .await?;
            }
            debug!(kind = %kind, blocker = %blocker, resource_id = resource_id, "Resource blocked");
        }
        Ok(blocked)
    }
}

enum ScheduleOutcome {
    Started { work_units: u64 },
    NothingToDo,
    AlreadyRunning,
    Blocked,
}
