//! Document-set and user-group membership sync
//!
//! Both kinds push membership changes to every affected document and then
//! either mark the membership up to date or, when it was pending deletion,
//! delete it. An empty membership still arms a fence with count 0 so the
//! next beat records it as synced.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::campaign::{Campaign, CampaignKind, DrainedCampaign, FinalizeOutcome, ResourceId, WorkItem};
use crate::collaborators::{MembershipKind, RelationalStore};
use crate::error::OrchestrationResult;

#[derive(Debug)]
pub struct MembershipSyncCampaign {
    relational: Arc<dyn RelationalStore>,
    membership: MembershipKind,
}

impl MembershipSyncCampaign {
    pub fn document_sets(relational: Arc<dyn RelationalStore>) -> Self {
        Self {
            relational,
            membership: MembershipKind::DocumentSet,
        }
    }

    pub fn user_groups(relational: Arc<dyn RelationalStore>) -> Self {
        Self {
            relational,
            membership: MembershipKind::UserGroup,
        }
    }

    pub fn membership(&self) -> MembershipKind {
        self.membership
    }
}

#[async_trait]
impl Campaign for MembershipSyncCampaign {
    fn kind(&self) -> CampaignKind {
        match self.membership {
            MembershipKind::DocumentSet => CampaignKind::DocumentSetSync,
            MembershipKind::UserGroup => CampaignKind::UserGroupSync,
        }
    }

    async fn resources_due(&self) -> OrchestrationResult<Vec<ResourceId>> {
        self.relational.memberships_needing_sync(self.membership).await
    }

    async fn enumerate_work(&self, resource_id: ResourceId) -> OrchestrationResult<Vec<WorkItem>> {
        Ok(self
            .relational
            .membership_unsynced_documents(self.membership, resource_id)
            .await?
            .into_iter()
            .map(WorkItem::document)
            .collect())
    }

    async fn finalize(&self, drained: &DrainedCampaign) -> OrchestrationResult<FinalizeOutcome> {
        let id = drained.resource_id;
        if self
            .relational
            .membership_pending_deletion(self.membership, id)
            .await?
        {
            self.relational.delete_membership(self.membership, id).await?;
            info!(kind = %self.kind(), resource_id = id, count = drained.expected, "Deleted membership after sync");
            return Ok(FinalizeOutcome::Deleted);
        }

        self.relational
            .mark_membership_synced(self.membership, id)
            .await?;
        info!(kind = %self.kind(), resource_id = id, count = drained.expected, "Membership up to date");
        Ok(FinalizeOutcome::Synced)
    }
}
