//! # Generator
//!
//! Producer side of a campaign: enumerate the work for one resource, emit one
//! executor task per item, record each id in the task set, and only then arm
//! the fence.
//!
//! Three entry points cover the campaign kinds:
//!
//! - [`Generator::try_generate`] runs the whole fan-out inline (sync kinds, deletion)
//! - [`Generator::dispatch_driver`] acquires the fence and submits a driver task
//!   (pruning, indexing)
//! - [`Generator::run_driver`] is the pruning driver's body: incremental fan-out,
//!   progress counting and the Generator Complete Signal
//!
//! A work id enters the task set before its task is submitted, so a unit that
//! finishes instantly can never remove its id ahead of the insert.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::campaign::{
    Campaign, CampaignFence, CampaignPayload, FenceStyle, FenceValue, ResourceId, WorkItem,
};
use crate::constants::completion;
use crate::coordination::CoordinationStore;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::executor::{TaskExecutor, TaskSubmission};
use crate::logging::log_campaign_operation;
use crate::metrics;

/// Arguments handed to a driver task
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DriverArgs {
    pub resource_id: ResourceId,
    pub driver_task_id: String,
    pub index_attempt_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Generator {
    store: Arc<dyn CoordinationStore>,
    executor: Arc<dyn TaskExecutor>,
    liveness_ttl: Duration,
}

impl Generator {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        executor: Arc<dyn TaskExecutor>,
        liveness_ttl: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            liveness_ttl,
        }
    }

    fn fence(&self, campaign: &dyn Campaign, resource_id: ResourceId) -> CampaignFence {
        CampaignFence::new(self.store.clone(), campaign.kind(), resource_id)
    }

    /// Run a driverless campaign's fan-out.
    ///
    /// Returns `None` when a campaign already owns the resource, otherwise the
    /// number of work units emitted.
    #[instrument(skip(self, campaign), fields(kind = %campaign.kind()))]
    pub async fn try_generate(
        &self,
        campaign: &dyn Campaign,
        resource_id: ResourceId,
    ) -> OrchestrationResult<Option<u64>> {
        let kind = campaign.kind();
        let fence = self.fence(campaign, resource_id);

        if fence.read().await?.is_some() {
            debug!(resource_id = resource_id, "Campaign already running");
            return Ok(None);
        }

        match kind.fence_style() {
            FenceStyle::Count => {
                if !fence.begin_generation(self.liveness_ttl).await? {
                    debug!(resource_id = resource_id, "Another generator owns this resource");
                    return Ok(None);
                }
                let generated = self.generate_counted(campaign, &fence).await;
                if let Err(e) = fence.end_generation().await {
                    warn!(resource_id = resource_id, error = %e, "Failed to end generation claim");
                }
                generated
            }
            FenceStyle::Payload => {
                if !fence.acquire(&CampaignPayload::new(), self.liveness_ttl).await? {
                    return Ok(None);
                }

                let populated = async {
                    let items = campaign.enumerate_work(resource_id).await?;
                    fence.clear_taskset().await?;
                    self.emit_all(campaign, &fence, &items).await
                }
                .await;

                match populated {
                    Ok(emitted) => {
                        fence
                            .update_payload(|payload| payload.expected = Some(emitted))
                            .await?;
                        self.record_generated(campaign, resource_id, emitted);
                        Ok(Some(emitted))
                    }
                    Err(e) => {
                        warn!(resource_id = resource_id, error = %e, "Generation failed; releasing fence");
                        fence.release().await?;
                        Err(e)
                    }
                }
            }
        }
    }

    /// Count-fence fan-out under the generation claim
    async fn generate_counted(
        &self,
        campaign: &dyn Campaign,
        fence: &CampaignFence,
    ) -> OrchestrationResult<Option<u64>> {
        let kind = campaign.kind();
        let resource_id = fence.resource_id();
        // A generator that finished between the first read and the claim
        if fence.read().await?.is_some() {
            return Ok(None);
        }

        // Enumeration failure leaves no fence behind
        let items = campaign.enumerate_work(resource_id).await?;
        fence.clear_taskset().await?;
        let emitted = self.emit_all(campaign, fence, &items).await?;

        if emitted == 0 && !kind.arms_when_empty() {
            debug!(resource_id = resource_id, "Nothing to do; no fence armed");
            return Ok(Some(0));
        }
        fence.arm(&FenceValue::Count(emitted)).await?;
        self.record_generated(campaign, resource_id, emitted);
        Ok(Some(emitted))
    }

    /// Acquire the fence of a driver kind and submit its driver task.
    ///
    /// Returns the driver task id, or `None` when a campaign already owns the
    /// resource. The driver records its own id in the payload when it starts.
    #[instrument(skip(self, campaign), fields(kind = %campaign.kind()))]
    pub async fn dispatch_driver(
        &self,
        campaign: &dyn Campaign,
        resource_id: ResourceId,
    ) -> OrchestrationResult<Option<String>> {
        let kind = campaign.kind();
        let (Some(task_name), Some(queue)) = (kind.driver_task_name(), kind.driver_queue()) else {
            return Err(OrchestrationError::InvalidArguments(format!(
                "{kind} campaigns have no driver task"
            )));
        };

        let fence = self.fence(campaign, resource_id);
        if fence.read().await?.is_some() {
            return Ok(None);
        }
        if !fence.acquire(&CampaignPayload::new(), self.liveness_ttl).await? {
            return Ok(None);
        }

        let attempt_id = match campaign.prepare_driver(resource_id).await {
            Ok(attempt_id) => attempt_id,
            Err(e) => {
                fence.release().await?;
                return Err(e);
            }
        };
        let payload = fence
            .update_payload(|payload| payload.index_attempt_id = attempt_id)
            .await?
            .ok_or_else(|| {
                OrchestrationError::invalid_fence(fence.keys().fence(), "fence vanished before driver submission")
            })?;

        let driver_task_id = Uuid::new_v4().to_string();
        let args = DriverArgs {
            resource_id,
            driver_task_id: driver_task_id.clone(),
            index_attempt_id: attempt_id,
        };
        let submission = TaskSubmission::new(task_name, queue, serde_json::to_value(&args)?)
            .with_task_id(driver_task_id.clone())
            .with_priority(kind.driver_priority());

        if let Err(e) = self.executor.submit(submission).await {
            let reason = format!("driver submission failed: {e}");
            campaign.on_orphaned(resource_id, &payload, &reason).await?;
            fence.release().await?;
            return Err(e.into());
        }

        log_campaign_operation("dispatch_driver", kind, resource_id, "submitted", Some(&driver_task_id));
        metrics::campaigns_generated_total().add(1, &metrics::kind_label(kind));
        Ok(Some(driver_task_id))
    }

    /// Mark the payload as owned by `driver_task_id`.
    ///
    /// Fails when the fence is gone (the watchdog reset it) or belongs to a
    /// different driver; the caller must then stop without touching the campaign.
    pub async fn claim_driver(
        &self,
        fence: &CampaignFence,
        driver_task_id: &str,
        arm: Option<u64>,
    ) -> OrchestrationResult<CampaignPayload> {
        let current = match fence.read().await? {
            Some(FenceValue::Payload(payload)) => payload,
            Some(FenceValue::Count(_)) => {
                return Err(OrchestrationError::invalid_fence(
                    fence.keys().fence(),
                    "driver kinds use payload fences",
                ))
            }
            None => {
                return Err(OrchestrationError::invalid_fence(
                    fence.keys().fence(),
                    format!("fence absent when driver {driver_task_id} started"),
                ))
            }
        };
        if let Some(owner) = &current.executor_task_id {
            if owner != driver_task_id {
                return Err(OrchestrationError::invalid_fence(
                    fence.keys().fence(),
                    format!("fence owned by driver {owner}"),
                ));
            }
        }

        let claimed = fence
            .update_payload(|payload| {
                payload.executor_task_id = Some(driver_task_id.to_string());
                payload.started_at.get_or_insert_with(Utc::now);
                if arm.is_some() {
                    payload.expected = arm;
                }
            })
            .await?
            .ok_or_else(|| {
                OrchestrationError::invalid_fence(fence.keys().fence(), "fence vanished during claim")
            })?;
        fence.set_active(self.liveness_ttl).await?;
        Ok(claimed)
    }

    /// Body of the pruning driver task: claim, fan out incrementally, arm,
    /// then write the Generator Complete Signal.
    ///
    /// Any failure after the claim still arms the fence with the units emitted
    /// so far and writes the failure code, so the monitor can drain and
    /// release the campaign.
    #[instrument(skip(self, campaign), fields(kind = %campaign.kind()))]
    pub async fn run_driver(
        &self,
        campaign: &dyn Campaign,
        resource_id: ResourceId,
        driver_task_id: &str,
    ) -> OrchestrationResult<u64> {
        let fence = self.fence(campaign, resource_id);
        self.claim_driver(&fence, driver_task_id, None).await?;
        fence.clear_taskset().await?;

        let generated = async {
            let items = campaign.enumerate_work(resource_id).await?;
            let mut emitted = 0u64;
            for item in &items {
                if fence.is_terminating(driver_task_id).await? {
                    return Err(OrchestrationError::Terminated {
                        driver_task_id: driver_task_id.to_string(),
                    });
                }
                self.emit_one(campaign, &fence, item).await?;
                emitted += 1;
                fence.bump_progress(1).await?;
                fence.set_active(self.liveness_ttl).await?;
            }
            Ok::<u64, OrchestrationError>(emitted)
        }
        .await;

        match generated {
            Ok(emitted) => {
                if !fence
                    .finish_as(driver_task_id, Some(emitted), completion::OK)
                    .await?
                {
                    return Err(OrchestrationError::invalid_fence(
                        fence.keys().fence(),
                        format!("fence reset before driver {driver_task_id} finished"),
                    ));
                }
                self.record_generated(campaign, resource_id, emitted);
                Ok(emitted)
            }
            Err(e) => {
                let emitted = fence.progress().await?.max(0) as u64;
                warn!(
                    resource_id = resource_id,
                    emitted = emitted,
                    error = %e,
                    "Driver failed; signalling failure"
                );
                fence
                    .finish_as(driver_task_id, Some(emitted), completion::FAILED)
                    .await?;
                fence.clear_termination(driver_task_id).await?;
                Err(e)
            }
        }
    }

    async fn emit_all(
        &self,
        campaign: &dyn Campaign,
        fence: &CampaignFence,
        items: &[WorkItem],
    ) -> OrchestrationResult<u64> {
        for item in items {
            self.emit_one(campaign, fence, item).await?;
        }
        Ok(items.len() as u64)
    }

    async fn emit_one(
        &self,
        campaign: &dyn Campaign,
        fence: &CampaignFence,
        item: &WorkItem,
    ) -> OrchestrationResult<String> {
        let kind = campaign.kind();
        let submission = TaskSubmission::new(
            kind.work_task_name(),
            kind.work_queue(),
            campaign.work_args(fence.resource_id(), item),
        )
        .with_priority(kind.work_priority());
        let task_id = submission.task_id.clone();

        fence.add_task(&task_id).await?;
        if let Err(e) = self.executor.submit(submission).await {
            fence.complete_task(&task_id).await?;
            return Err(e.into());
        }
        metrics::work_units_emitted_total().add(1, &metrics::kind_label(kind));
        Ok(task_id)
    }

    fn record_generated(&self, campaign: &dyn Campaign, resource_id: ResourceId, emitted: u64) {
        let kind = campaign.kind();
        info!(kind = %kind, resource_id = resource_id, emitted = emitted, "Campaign armed");
        metrics::campaigns_generated_total().add(1, &metrics::kind_label(kind));
    }
}
