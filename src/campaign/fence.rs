//! # Campaign Fence
//!
//! Per-resource view over the coordination store. A fence's presence is the
//! mutual-exclusion signal "a campaign owns this resource"; its task set holds
//! the ids of work units that have not finished yet.
//!
//! Writers follow arm-after-populate: task ids are inserted into the task set
//! before the fence carries its expected count, so a reader that sees an armed
//! fence also sees every emitted id.
//!
//! ```rust
//! use std::sync::Arc;
//! use docsync_orchestrator::campaign::{CampaignFence, CampaignKind, FenceValue};
//! use docsync_orchestrator::coordination::InMemoryCoordinationStore;
//!
//! # tokio_test::block_on(async {
//! let fence = CampaignFence::new(
//!     Arc::new(InMemoryCoordinationStore::new()),
//!     CampaignKind::DocumentSetSync,
//!     7,
//! );
//! fence.add_task("unit-1").await?;
//! fence.arm(&FenceValue::Count(1)).await?;
//! assert_eq!(fence.remaining().await?, 1);
//!
//! fence.complete_task("unit-1").await?;
//! assert_eq!(fence.remaining().await?, 0);
//! # Ok::<(), docsync_orchestrator::error::OrchestrationError>(())
//! # }).unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::keys::CampaignKeys;
use super::payload::{CampaignPayload, FenceValue};
use super::{CampaignKind, ResourceId};
use crate::coordination::CoordinationStore;
use crate::error::{OrchestrationError, OrchestrationResult};

#[derive(Debug, Clone)]
pub struct CampaignFence {
    store: Arc<dyn CoordinationStore>,
    keys: CampaignKeys,
}

impl CampaignFence {
    pub fn new(store: Arc<dyn CoordinationStore>, kind: CampaignKind, resource_id: ResourceId) -> Self {
        Self {
            store,
            keys: CampaignKeys::new(kind, resource_id),
        }
    }

    pub fn kind(&self) -> CampaignKind {
        self.keys.kind
    }

    pub fn resource_id(&self) -> ResourceId {
        self.keys.resource_id
    }

    pub fn keys(&self) -> &CampaignKeys {
        &self.keys
    }

    /// Create the fence only if absent and start the liveness window.
    /// Exactly one concurrent caller wins; the winner starts with no progress
    /// and no completion code.
    pub async fn acquire(
        &self,
        payload: &CampaignPayload,
        liveness_ttl: Duration,
    ) -> OrchestrationResult<bool> {
        let encoded = FenceValue::Payload(payload.clone()).encode()?;
        let acquired = self
            .store
            .set_if_absent(&self.keys.fence(), &encoded, None)
            .await?;
        if acquired {
            self.store
                .delete(&[self.keys.generator_complete(), self.keys.generator_progress()])
                .await?;
            self.set_active(liveness_ttl).await?;
        }
        debug!(kind = %self.kind(), resource_id = self.resource_id(), acquired = acquired, "Fence acquire");
        Ok(acquired)
    }

    /// Claim the right to generate a count-fence campaign. Exactly one
    /// concurrent caller wins; the claim lapses after `ttl` if never ended.
    pub async fn begin_generation(&self, ttl: Duration) -> OrchestrationResult<bool> {
        Ok(self
            .store
            .set_if_absent(&self.keys.generating(), "1", Some(ttl))
            .await?)
    }

    pub async fn end_generation(&self) -> OrchestrationResult<()> {
        self.store.delete(&[self.keys.generating()]).await?;
        Ok(())
    }

    /// Write the fence value unconditionally
    pub async fn arm(&self, value: &FenceValue) -> OrchestrationResult<()> {
        self.store
            .set(&self.keys.fence(), &value.encode()?, None)
            .await?;
        debug!(kind = %self.kind(), resource_id = self.resource_id(), expected = ?value.expected(), "Fence armed");
        Ok(())
    }

    pub async fn read(&self) -> OrchestrationResult<Option<FenceValue>> {
        let key = self.keys.fence();
        match self.store.get(&key).await? {
            Some(raw) => Ok(Some(FenceValue::decode(&key, &raw)?)),
            None => Ok(None),
        }
    }

    /// Read-modify-write of a payload fence; `Ok(None)` when the fence is gone
    pub async fn update_payload<F>(&self, update: F) -> OrchestrationResult<Option<CampaignPayload>>
    where
        F: FnOnce(&mut CampaignPayload),
    {
        let mut payload = match self.read().await? {
            Some(FenceValue::Payload(payload)) => payload,
            Some(FenceValue::Count(_)) => {
                return Err(OrchestrationError::invalid_fence(
                    self.keys.fence(),
                    "expected a payload fence, found a count",
                ))
            }
            None => return Ok(None),
        };
        update(&mut payload);
        self.arm(&FenceValue::Payload(payload.clone())).await?;
        Ok(Some(payload))
    }

    pub async fn add_tasks(&self, task_ids: &[String]) -> OrchestrationResult<u64> {
        Ok(self.store.set_add(&self.keys.taskset(), task_ids).await?)
    }

    pub async fn add_task(&self, task_id: &str) -> OrchestrationResult<bool> {
        Ok(self.add_tasks(&[task_id.to_string()]).await? == 1)
    }

    /// Remove one finished work unit; `false` if it was not outstanding
    pub async fn complete_task(&self, task_id: &str) -> OrchestrationResult<bool> {
        Ok(self.store.set_remove(&self.keys.taskset(), task_id).await?)
    }

    pub async fn remaining(&self) -> OrchestrationResult<u64> {
        Ok(self.store.set_cardinality(&self.keys.taskset()).await?)
    }

    pub async fn outstanding_tasks(&self) -> OrchestrationResult<Vec<String>> {
        Ok(self.store.set_members(&self.keys.taskset()).await?)
    }

    pub async fn clear_taskset(&self) -> OrchestrationResult<()> {
        self.store.delete(&[self.keys.taskset()]).await?;
        Ok(())
    }

    /// Delete the campaign's keys, the fence itself last so no key outlives
    /// it. Returns whether a fence was present.
    pub async fn release(&self) -> OrchestrationResult<bool> {
        self.store.delete(&self.keys.auxiliary()).await?;
        let fence_deleted = self.store.delete(&[self.keys.fence()]).await? > 0;
        debug!(kind = %self.kind(), resource_id = self.resource_id(), fence_deleted = fence_deleted, "Fence released");
        Ok(fence_deleted)
    }

    pub async fn set_generator_complete(&self, code: i64) -> OrchestrationResult<()> {
        self.store
            .set(&self.keys.generator_complete(), &code.to_string(), None)
            .await?;
        Ok(())
    }

    /// Payload of the fence while `driver_task_id` still owns it
    pub async fn owned_by(&self, driver_task_id: &str) -> OrchestrationResult<Option<CampaignPayload>> {
        Ok(match self.read().await? {
            Some(FenceValue::Payload(payload))
                if payload.executor_task_id.as_deref() == Some(driver_task_id) =>
            {
                Some(payload)
            }
            _ => None,
        })
    }

    /// Record the driver's final count (when given) and its completion code.
    ///
    /// Nothing is written unless `driver_task_id` still owns the fence; a
    /// driver whose fence was reset returns `false`.
    pub async fn finish_as(
        &self,
        driver_task_id: &str,
        expected: Option<u64>,
        code: i64,
    ) -> OrchestrationResult<bool> {
        let Some(mut payload) = self.owned_by(driver_task_id).await? else {
            debug!(kind = %self.kind(), resource_id = self.resource_id(), driver_task_id = driver_task_id, code = code, "Completion dropped; fence not owned");
            return Ok(false);
        };
        if expected.is_some() {
            payload.expected = expected;
            self.arm(&FenceValue::Payload(payload)).await?;
        }
        self.set_generator_complete(code).await?;
        Ok(true)
    }

    pub async fn generator_complete(&self) -> OrchestrationResult<Option<i64>> {
        let key = self.keys.generator_complete();
        match self.store.get(&key).await? {
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                OrchestrationError::invalid_fence(key, format!("completion code '{raw}' is not an integer"))
            }),
            None => Ok(None),
        }
    }

    pub async fn bump_progress(&self, by: i64) -> OrchestrationResult<i64> {
        Ok(self
            .store
            .increment(&self.keys.generator_progress(), by)
            .await?)
    }

    pub async fn progress(&self) -> OrchestrationResult<i64> {
        let key = self.keys.generator_progress();
        match self.store.get(&key).await? {
            Some(raw) => raw.trim().parse().map_err(|_| {
                OrchestrationError::invalid_fence(key, format!("progress '{raw}' is not an integer"))
            }),
            None => Ok(0),
        }
    }

    /// Set or refresh the liveness key
    pub async fn set_active(&self, ttl: Duration) -> OrchestrationResult<()> {
        self.store.set(&self.keys.active(), "1", Some(ttl)).await?;
        Ok(())
    }

    pub async fn is_active(&self) -> OrchestrationResult<bool> {
        Ok(self.store.exists(&self.keys.active()).await?)
    }

    /// Ask the driver task to stop cooperatively
    pub async fn request_termination(&self, driver_task_id: &str, ttl: Duration) -> OrchestrationResult<()> {
        let key = CampaignKeys::terminate(self.kind(), driver_task_id);
        self.store.set(&key, "1", Some(ttl)).await?;
        debug!(kind = %self.kind(), resource_id = self.resource_id(), driver_task_id = driver_task_id, "Termination requested");
        Ok(())
    }

    pub async fn is_terminating(&self, driver_task_id: &str) -> OrchestrationResult<bool> {
        Ok(self
            .store
            .exists(&CampaignKeys::terminate(self.kind(), driver_task_id))
            .await?)
    }

    pub async fn clear_termination(&self, driver_task_id: &str) -> OrchestrationResult<()> {
        self.store
            .delete(&[CampaignKeys::terminate(self.kind(), driver_task_id)])
            .await?;
        Ok(())
    }

    /// Resource ids with a live fence of `kind`, sorted ascending
    pub async fn fenced_resources(
        store: &Arc<dyn CoordinationStore>,
        kind: CampaignKind,
    ) -> OrchestrationResult<Vec<ResourceId>> {
        let mut ids: Vec<ResourceId> = store
            .scan_prefix(&CampaignKeys::fence_prefix(kind))
            .await?
            .iter()
            .filter_map(|key| CampaignKeys::parse_fence_key(kind, key))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
