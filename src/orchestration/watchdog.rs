//! # Watchdog
//!
//! Reconciles payload fences whose owner may have died. A pass is throttled
//! through a signal key that lives for `watchdog.interval_seconds`, so however
//! often it is invoked it runs at most once per window across all processes.
//!
//! For driver kinds:
//!
//! | driver id | executor knows it | liveness key | action            |
//! |-----------|-------------------|--------------|-------------------|
//! | empty     | -                 | present      | leave             |
//! | empty     | -                 | expired      | orphan + reset    |
//! | set       | yes               | -            | refresh liveness  |
//! | set       | no                | present      | leave             |
//! | set       | no                | expired      | orphan + reset    |
//!
//! Fences whose generator already signalled completion belong to the monitor
//! and are never touched. Driverless payload fences (deletion) are reset only
//! while still unarmed and without liveness.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tracing::{debug, error, info, instrument, warn};

use super::registry::CampaignRegistry;
use crate::campaign::{Campaign, CampaignFence, CampaignPayload, FenceStyle, FenceValue, ResourceId};
use crate::config::WatchdogConfig;
use crate::constants::{keys, locks};
use crate::coordination::{BeatLock, CoordinationStore};
use crate::error::OrchestrationResult;
use crate::executor::TaskExecutor;
use crate::logging::log_fence_reset;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogSkip {
    Disabled,
    /// Another pass ran within the current window
    Throttled,
    /// Another process holds the watchdog beat lock
    Locked,
}

/// Per-fence verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenceVerdict {
    /// Nothing to reconcile (count fence, completed generator, gone)
    Ignored,
    /// Creation window bridged by the liveness key
    Waiting,
    /// Driver found in the executor; liveness refreshed
    Alive,
    Reset { reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchdogReport {
    pub skipped: Option<WatchdogSkip>,
    pub inspected: u64,
    pub refreshed: u64,
    pub reset: u64,
    pub errors: u64,
}

impl WatchdogReport {
    fn skipped(reason: WatchdogSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    store: Arc<dyn CoordinationStore>,
    executor: Arc<dyn TaskExecutor>,
    registry: Arc<CampaignRegistry>,
    config: WatchdogConfig,
    lock_timeout: Duration,
}

impl Watchdog {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        executor: Arc<dyn TaskExecutor>,
        registry: Arc<CampaignRegistry>,
        config: WatchdogConfig,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            registry,
            config,
            lock_timeout,
        }
    }

    pub fn signal_key() -> String {
        format!("{}:{}", keys::SIGNAL, locks::WATCHDOG_BEAT)
    }

    /// Run one throttled validation pass
    #[instrument(skip(self))]
    pub async fn validate(&self) -> OrchestrationResult<WatchdogReport> {
        if !self.config.enabled {
            return Ok(WatchdogReport::skipped(WatchdogSkip::Disabled));
        }

        if !self
            .store
            .set_if_absent(&Self::signal_key(), "1", Some(self.config.interval()))
            .await?
        {
            debug!("Watchdog ran within the current window; skipping");
            return Ok(WatchdogReport::skipped(WatchdogSkip::Throttled));
        }

        let Some(lock) =
            BeatLock::try_acquire(self.store.clone(), locks::WATCHDOG_BEAT, self.lock_timeout).await?
        else {
            metrics::beats_skipped_total().add(1, &[KeyValue::new("lock", locks::WATCHDOG_BEAT)]);
            return Ok(WatchdogReport::skipped(WatchdogSkip::Locked));
        };

        let mut report = WatchdogReport::default();
        let scanned = self.scan(&lock, &mut report).await;
        if let Err(e) = lock.release().await {
            warn!(error = %e, "Failed to release watchdog lock");
        }
        scanned?;

        if report.reset > 0 || report.errors > 0 {
            info!(
                inspected = report.inspected,
                refreshed = report.refreshed,
                reset = report.reset,
                errors = report.errors,
                "Watchdog pass completed"
            );
        }
        Ok(report)
    }

    async fn scan(&self, lock: &BeatLock, report: &mut WatchdogReport) -> OrchestrationResult<()> {
        for campaign in self.registry.campaigns() {
            let kind = campaign.kind();
            if kind.fence_style() != FenceStyle::Payload {
                continue;
            }

            let resources = match CampaignFence::fenced_resources(&self.store, kind).await {
                Ok(resources) => resources,
                Err(e) => {
                    error!(kind = %kind, error = %e, "Failed to list fences");
                    report.errors += 1;
                    continue;
                }
            };

            for resource_id in resources {
                lock.reacquire().await?;
                report.inspected += 1;
                match self.validate_fence(campaign.as_ref(), resource_id).await {
                    Ok(FenceVerdict::Alive) => report.refreshed += 1,
                    Ok(FenceVerdict::Reset { .. }) => report.reset += 1,
                    Ok(_) => {}
                    Err(e) => {
                        error!(kind = %kind, resource_id = resource_id, error = %e, "Failed to validate fence");
                        report.errors += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Reconcile one fence
    pub async fn validate_fence(
        &self,
        campaign: &dyn Campaign,
        resource_id: ResourceId,
    ) -> OrchestrationResult<FenceVerdict> {
        let kind = campaign.kind();
        let fence = CampaignFence::new(self.store.clone(), kind, resource_id);

        let payload = match fence.read().await? {
            Some(FenceValue::Payload(payload)) => payload,
            Some(FenceValue::Count(_)) | None => return Ok(FenceVerdict::Ignored),
        };

        // A claimed, armed driver fence with a completion code is the monitor's
        if kind.has_driver()
            && payload.executor_task_id.is_some()
            && payload.is_armed()
            && fence.generator_complete().await?.is_some()
        {
            return Ok(FenceVerdict::Ignored);
        }

        if !kind.has_driver() {
            if payload.is_armed() || fence.is_active().await? {
                return Ok(FenceVerdict::Ignored);
            }
            let reason = "generator died before arming the fence".to_string();
            return self.reset(campaign, &fence, &payload, reason).await;
        }

        let Some(driver_task_id) = payload.executor_task_id.clone() else {
            if fence.is_active().await? {
                return Ok(FenceVerdict::Waiting);
            }
            let reason = "driver task never started and liveness expired".to_string();
            return self.reset(campaign, &fence, &payload, reason).await;
        };

        let queue = kind.driver_queue().unwrap_or_else(|| kind.work_queue());
        if self.executor.is_task_known(queue, &driver_task_id).await? {
            fence.set_active(self.config.liveness_ttl()).await?;
            debug!(kind = %kind, resource_id = resource_id, driver_task_id = %driver_task_id, "Driver alive");
            return Ok(FenceVerdict::Alive);
        }

        if fence.is_active().await? {
            return Ok(FenceVerdict::Waiting);
        }

        let reason = format!(
            "driver task {driver_task_id} not found in executor queued/reserved/active lists and liveness expired"
        );
        self.reset(campaign, &fence, &payload, reason).await
    }

    async fn reset(
        &self,
        campaign: &dyn Campaign,
        fence: &CampaignFence,
        payload: &CampaignPayload,
        reason: String,
    ) -> OrchestrationResult<FenceVerdict> {
        let kind = campaign.kind();
        let resource_id = fence.resource_id();
        campaign.on_orphaned(resource_id, payload, &reason).await?;
        fence.release().await?;
        log_fence_reset(kind, resource_id, &reason);
        metrics::fences_reset_total().add(
            1,
            &[
                KeyValue::new("kind", kind.key_prefix()),
                KeyValue::new(
                    "reason",
                    if payload.executor_task_id.is_some() {
                        "orphaned"
                    } else {
                        "unarmed"
                    },
                ),
            ],
        );
        Ok(FenceVerdict::Reset { reason })
    }
}
