//! Stale-document metadata sync for one connector/credential pair

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::campaign::{Campaign, CampaignKind, DrainedCampaign, FinalizeOutcome, ResourceId, WorkItem};
use crate::collaborators::RelationalStore;
use crate::error::OrchestrationResult;

#[derive(Debug)]
pub struct ConnectorSyncCampaign {
    relational: Arc<dyn RelationalStore>,
}

impl ConnectorSyncCampaign {
    pub fn new(relational: Arc<dyn RelationalStore>) -> Self {
        Self { relational }
    }
}

#[async_trait]
impl Campaign for ConnectorSyncCampaign {
    fn kind(&self) -> CampaignKind {
        CampaignKind::ConnectorSync
    }

    async fn resources_due(&self) -> OrchestrationResult<Vec<ResourceId>> {
        self.relational.cc_pairs_with_stale_documents().await
    }

    async fn enumerate_work(&self, resource_id: ResourceId) -> OrchestrationResult<Vec<WorkItem>> {
        Ok(self
            .relational
            .stale_documents(resource_id)
            .await?
            .into_iter()
            .map(WorkItem::document)
            .collect())
    }

    async fn finalize(&self, drained: &DrainedCampaign) -> OrchestrationResult<FinalizeOutcome> {
        // Each work unit already cleared its own document's sync flag
        info!(
            cc_pair_id = drained.resource_id,
            count = drained.expected,
            "Connector metadata sync finished"
        );
        Ok(FinalizeOutcome::Synced)
    }
}
