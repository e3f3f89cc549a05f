//! Connector/credential pair deletion
//!
//! Every document of the pair gets a cleanup work unit; once they drain the
//! pair's remaining rows are removed in one cascading delete.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::campaign::{Campaign, CampaignKind, DrainedCampaign, FinalizeOutcome, ResourceId, WorkItem};
use crate::collaborators::RelationalStore;
use crate::error::OrchestrationResult;

#[derive(Debug)]
pub struct ConnectorDeletionCampaign {
    relational: Arc<dyn RelationalStore>,
}

impl ConnectorDeletionCampaign {
    pub fn new(relational: Arc<dyn RelationalStore>) -> Self {
        Self { relational }
    }
}

#[async_trait]
impl Campaign for ConnectorDeletionCampaign {
    fn kind(&self) -> CampaignKind {
        CampaignKind::ConnectorDeletion
    }

    async fn resources_due(&self) -> OrchestrationResult<Vec<ResourceId>> {
        self.relational.cc_pairs_pending_deletion().await
    }

    async fn enumerate_work(&self, resource_id: ResourceId) -> OrchestrationResult<Vec<WorkItem>> {
        Ok(self
            .relational
            .cc_pair_documents(resource_id)
            .await?
            .into_iter()
            .map(WorkItem::document)
            .collect())
    }

    async fn finalize(&self, drained: &DrainedCampaign) -> OrchestrationResult<FinalizeOutcome> {
        self.relational
            .delete_cc_pair_cascade(drained.resource_id)
            .await?;
        info!(
            cc_pair_id = drained.resource_id,
            documents = drained.expected,
            "Connector/credential pair deleted"
        );
        Ok(FinalizeOutcome::Deleted)
    }
}
