//! Per-kind campaign behaviour

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::payload::CampaignPayload;
use super::CampaignKind;
use crate::error::OrchestrationResult;

/// Identifier of the resource a campaign runs against (pair, set, group)
pub type ResourceId = i64;

/// One unit of work a generator emits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub document_id: String,
}

impl WorkItem {
    pub fn document(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
        }
    }
}

/// Identifies the campaign a work unit belongs to; carried in task arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRef {
    pub kind: CampaignKind,
    pub resource_id: ResourceId,
}

/// Snapshot handed to [`Campaign::finalize`] once a campaign has drained
#[derive(Debug, Clone, PartialEq)]
pub struct DrainedCampaign {
    pub kind: CampaignKind,
    pub resource_id: ResourceId,
    pub expected: u64,
    pub payload: Option<CampaignPayload>,
    /// Generator Complete Signal, for kinds that wait for it
    pub completion: Option<i64>,
}

/// Durable state change applied at finalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Metadata pushed for every outstanding document
    Synced,
    /// The resource itself was removed (empty set pending deletion, deleted pair)
    Deleted,
    Pruned,
    AttemptSucceeded,
    AttemptFailed { reason: String },
    /// Nothing to commit (generator failed, attempt already terminal)
    Skipped { reason: String },
}

#[async_trait]
pub trait Campaign: Send + Sync + std::fmt::Debug + 'static {
    fn kind(&self) -> CampaignKind;

    /// Resources the scheduling pass should try to start a campaign for
    async fn resources_due(&self) -> OrchestrationResult<Vec<ResourceId>>;

    /// Work list for one resource
    async fn enumerate_work(&self, resource_id: ResourceId) -> OrchestrationResult<Vec<WorkItem>>;

    async fn finalize(&self, drained: &DrainedCampaign) -> OrchestrationResult<FinalizeOutcome>;

    /// Runs after the fence is acquired and before the driver task is submitted.
    /// Returns the durable attempt id to record in the payload, if any.
    async fn prepare_driver(&self, _resource_id: ResourceId) -> OrchestrationResult<Option<i64>> {
        Ok(None)
    }

    /// The watchdog concluded the driver died; record the failure durably
    async fn on_orphaned(
        &self,
        _resource_id: ResourceId,
        _payload: &CampaignPayload,
        _reason: &str,
    ) -> OrchestrationResult<()> {
        Ok(())
    }

    /// Whether a fence still waiting on its generator can never complete and
    /// should be released without finalizing
    async fn abandoned(
        &self,
        _resource_id: ResourceId,
        _payload: &CampaignPayload,
    ) -> OrchestrationResult<bool> {
        Ok(false)
    }

    /// Task arguments for one work unit
    fn work_args(&self, resource_id: ResourceId, item: &WorkItem) -> serde_json::Value {
        json!({
            "campaign": CampaignRef { kind: self.kind(), resource_id },
            "document_id": item.document_id,
        })
    }
}
