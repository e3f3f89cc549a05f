//! Child-side reporting for a spawned indexing run.
//!
//! The indexing process opens its own coordination store connection and uses
//! this helper to prove liveness, publish progress, observe termination
//! requests and write its completion signal. Once the fence no longer
//! belongs to this run's driver (the watchdog reset it), nothing is written
//! and `should_stop` turns true.

use std::sync::Arc;
use std::time::Duration;

use crate::campaign::{CampaignFence, CampaignKind};
use crate::collaborators::CcPairId;
use crate::coordination::CoordinationStore;
use crate::error::{OrchestrationError, OrchestrationResult};

#[derive(Debug, Clone)]
pub struct IndexingHeartbeat {
    fence: CampaignFence,
    driver_task_id: String,
    liveness_ttl: Duration,
}

impl IndexingHeartbeat {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        cc_pair_id: CcPairId,
        driver_task_id: impl Into<String>,
        liveness_ttl: Duration,
    ) -> Self {
        Self {
            fence: CampaignFence::new(store, CampaignKind::ConnectorIndexing, cc_pair_id),
            driver_task_id: driver_task_id.into(),
            liveness_ttl,
        }
    }

    /// Record `documents` more processed documents; returns the running total
    pub async fn progress(&self, documents: u64) -> OrchestrationResult<i64> {
        if self.fence.owned_by(&self.driver_task_id).await?.is_none() {
            return Err(OrchestrationError::invalid_fence(
                self.fence.keys().fence(),
                format!("fence no longer owned by driver {}", self.driver_task_id),
            ));
        }
        let total = self
            .fence
            .bump_progress(i64::try_from(documents).unwrap_or(i64::MAX))
            .await?;
        self.fence.set_active(self.liveness_ttl).await?;
        Ok(total)
    }

    /// Write the completion code; `false` when the fence was reset
    pub async fn complete(&self, code: i64) -> OrchestrationResult<bool> {
        self.fence.finish_as(&self.driver_task_id, None, code).await
    }

    pub async fn should_stop(&self) -> OrchestrationResult<bool> {
        if self.fence.is_terminating(&self.driver_task_id).await? {
            return Ok(true);
        }
        Ok(self.fence.owned_by(&self.driver_task_id).await?.is_none())
    }
}
