//! # Monitor (Beat)
//!
//! Periodic scan of every live fence. A drained campaign is finalized through
//! its [`Campaign`] and its keys are released; anything else is left for a
//! later beat.
//!
//! ## Lock discipline
//!
//! One beat runs at a time across all processes. The beat lock is taken
//! without blocking (a held lock means the beat is skipped) and its lease is
//! renewed before every resource. A failed renewal aborts the beat with
//! [`OrchestrationError::LockLost`] instead of finalizing under a lock some
//! other beat may now hold.
//!
//! ## Error handling
//!
//! Store or relational errors on one resource are logged and counted; the
//! scan moves on. A soft time limit ends the scan early and is reported in the
//! [`BeatReport`], not as an error.

use std::sync::Arc;

use opentelemetry::KeyValue;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::registry::CampaignRegistry;
use crate::campaign::{Campaign, CampaignFence, DrainedCampaign, FinalizeOutcome, ResourceId};
use crate::config::MonitorConfig;
use crate::constants::locks;
use crate::coordination::{BeatLock, CoordinationStore};
use crate::error::OrchestrationResult;
use crate::logging::log_campaign_operation;
use crate::metrics;

/// What one beat concluded about one fence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignCheck {
    /// No fence (already finalized or reset)
    Absent,
    /// Fence exists but the generator or driver has not armed it yet
    Pending,
    InFlight { remaining: u64, expected: u64 },
    /// Work may be drained but the generator has not signalled completion
    AwaitingGenerator { remaining: u64 },
    /// Released without finalizing; the campaign can never complete
    Abandoned,
    Finalized { count: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeatReport {
    /// Another beat held the lock
    pub skipped: bool,
    pub inspected: u64,
    pub pending: u64,
    pub in_flight: u64,
    pub awaiting_generator: u64,
    pub abandoned: u64,
    pub finalized: u64,
    pub errors: u64,
    /// The soft time limit ended the scan early
    pub soft_limited: bool,
}

impl BeatReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn record(&mut self, check: &CampaignCheck) {
        self.inspected += 1;
        match check {
            CampaignCheck::Absent => {}
            CampaignCheck::Pending => self.pending += 1,
            CampaignCheck::InFlight { .. } => self.in_flight += 1,
            CampaignCheck::AwaitingGenerator { .. } => self.awaiting_generator += 1,
            CampaignCheck::Abandoned => self.abandoned += 1,
            CampaignCheck::Finalized { .. } => self.finalized += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Monitor {
    store: Arc<dyn CoordinationStore>,
    registry: Arc<CampaignRegistry>,
    config: MonitorConfig,
}

impl Monitor {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        registry: Arc<CampaignRegistry>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Run one beat across every registered campaign kind
    #[instrument(skip(self))]
    pub async fn beat(&self) -> OrchestrationResult<BeatReport> {
        let Some(lock) = BeatLock::try_acquire(
            self.store.clone(),
            locks::MONITOR_BEAT,
            self.config.lock_timeout(),
        )
        .await?
        else {
            debug!("Monitor beat already running elsewhere; skipping");
            metrics::beats_skipped_total().add(1, &[KeyValue::new("lock", locks::MONITOR_BEAT)]);
            return Ok(BeatReport::skipped());
        };

        let mut report = BeatReport::default();
        let scanned = self.scan(&lock, &mut report).await;

        if let Err(e) = lock.release().await {
            warn!(error = %e, "Failed to release monitor beat lock");
        }
        scanned?;

        if report.finalized > 0 || report.errors > 0 {
            info!(
                inspected = report.inspected,
                finalized = report.finalized,
                in_flight = report.in_flight,
                errors = report.errors,
                soft_limited = report.soft_limited,
                "Monitor beat completed"
            );
        } else {
            debug!(inspected = report.inspected, "Monitor beat completed");
        }
        Ok(report)
    }

    async fn scan(&self, lock: &BeatLock, report: &mut BeatReport) -> OrchestrationResult<()> {
        let started = Instant::now();
        let soft_limit = self.config.soft_time_limit();

        for campaign in self.registry.campaigns() {
            let kind = campaign.kind();
            let resources = match CampaignFence::fenced_resources(&self.store, kind).await {
                Ok(resources) => resources,
                Err(e) => {
                    error!(kind = %kind, error = %e, "Failed to list fences");
                    report.errors += 1;
                    continue;
                }
            };

            for resource_id in resources {
                if started.elapsed() >= soft_limit {
                    warn!(
                        kind = %kind,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Monitor beat hit its soft time limit; remaining fences wait for the next beat"
                    );
                    report.soft_limited = true;
                    return Ok(());
                }

                lock.reacquire().await?;

                match self.check(campaign.as_ref(), resource_id).await {
                    Ok(check) => report.record(&check),
                    Err(e) if e.is_lock_lost() => return Err(e),
                    Err(e) => {
                        error!(kind = %kind, resource_id = resource_id, error = %e, "Failed to check campaign");
                        report.errors += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Inspect one fence and finalize it if drained
    pub async fn check(
        &self,
        campaign: &dyn Campaign,
        resource_id: ResourceId,
    ) -> OrchestrationResult<CampaignCheck> {
        let kind = campaign.kind();
        let fence = CampaignFence::new(self.store.clone(), kind, resource_id);

        let Some(value) = fence.read().await? else {
            return Ok(CampaignCheck::Absent);
        };
        let payload = value.payload().cloned();
        let remaining = fence.remaining().await?;

        let completion = if kind.requires_generator_complete() {
            let completion = fence.generator_complete().await?;
            if completion.is_none() {
                if let Some(payload) = &payload {
                    if campaign.abandoned(resource_id, payload).await? {
                        fence.release().await?;
                        log_campaign_operation("monitor", kind, resource_id, "abandoned", None);
                        return Ok(CampaignCheck::Abandoned);
                    }
                    if payload.executor_task_id.is_none() {
                        return Ok(CampaignCheck::Pending);
                    }
                }
                return Ok(CampaignCheck::AwaitingGenerator { remaining });
            }
            // A code on a fence no driver has claimed and armed belongs to an
            // earlier campaign on this resource
            let claimed = payload
                .as_ref()
                .is_some_and(|payload| payload.executor_task_id.is_some() && payload.is_armed());
            if !claimed {
                debug!(kind = %kind, resource_id = resource_id, completion = ?completion, "Ignoring completion code on an unclaimed fence");
                return Ok(CampaignCheck::Pending);
            }
            completion
        } else {
            if !value.is_armed() {
                return Ok(CampaignCheck::Pending);
            }
            None
        };

        let expected = value.expected().unwrap_or(0);
        if remaining > 0 {
            debug!(kind = %kind, resource_id = resource_id, remaining = remaining, expected = expected, "Campaign in flight");
            return Ok(CampaignCheck::InFlight {
                remaining,
                expected,
            });
        }

        let drained = DrainedCampaign {
            kind,
            resource_id,
            expected,
            payload,
            completion,
        };
        let outcome = campaign.finalize(&drained).await?;

        // Released only after the durable change committed; a failed finalize
        // is retried on the next beat.
        if !fence.release().await? {
            debug!(kind = %kind, resource_id = resource_id, "Fence already released");
        }

        let status = match &outcome {
            FinalizeOutcome::AttemptFailed { .. } => "attempt_failed",
            FinalizeOutcome::Skipped { .. } => "skipped",
            _ => "finalized",
        };
        log_campaign_operation("monitor", kind, resource_id, status, Some(&format!("{outcome:?}")));
        metrics::campaigns_finalized_total().add(1, &metrics::kind_label(kind));
        Ok(CampaignCheck::Finalized { count: expected })
    }
}
