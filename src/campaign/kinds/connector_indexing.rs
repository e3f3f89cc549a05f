//! Indexing: one supervised indexing run per connector/credential pair
//!
//! No work units are fanned out; the driver task supervises a child process
//! and reports through the Generator Complete Signal. The durable attempt
//! record is created before the driver is submitted.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::campaign::{
    Campaign, CampaignKind, CampaignPayload, DrainedCampaign, FinalizeOutcome, ResourceId,
    WorkItem,
};
use crate::collaborators::RelationalStore;
use crate::constants::completion;
use crate::error::OrchestrationResult;

#[derive(Debug)]
pub struct ConnectorIndexingCampaign {
    relational: Arc<dyn RelationalStore>,
}

impl ConnectorIndexingCampaign {
    pub fn new(relational: Arc<dyn RelationalStore>) -> Self {
        Self { relational }
    }
}

#[async_trait]
impl Campaign for ConnectorIndexingCampaign {
    fn kind(&self) -> CampaignKind {
        CampaignKind::ConnectorIndexing
    }

    async fn resources_due(&self) -> OrchestrationResult<Vec<ResourceId>> {
        self.relational.cc_pairs_due_for_indexing().await
    }

    async fn enumerate_work(&self, _resource_id: ResourceId) -> OrchestrationResult<Vec<WorkItem>> {
        Ok(Vec::new())
    }

    async fn finalize(&self, drained: &DrainedCampaign) -> OrchestrationResult<FinalizeOutcome> {
        let Some(attempt_id) = drained.payload.as_ref().and_then(|p| p.index_attempt_id) else {
            return Ok(FinalizeOutcome::Skipped {
                reason: "fence carries no index attempt".to_string(),
            });
        };

        match self.relational.index_attempt(attempt_id).await? {
            None => Ok(FinalizeOutcome::Skipped {
                reason: format!("index attempt {attempt_id} no longer exists"),
            }),
            Some(attempt) if attempt.status.is_terminal() => Ok(FinalizeOutcome::Skipped {
                reason: format!("index attempt {attempt_id} already {:?}", attempt.status),
            }),
            Some(_) => match drained.completion {
                Some(code) if completion::is_ok(code) => {
                    self.relational.mark_attempt_succeeded(attempt_id).await?;
                    info!(cc_pair_id = drained.resource_id, attempt_id = attempt_id, "Indexing attempt succeeded");
                    Ok(FinalizeOutcome::AttemptSucceeded)
                }
                code => {
                    let reason = format!("indexing run finished with completion code {code:?}");
                    self.relational
                        .mark_attempt_failed(attempt_id, &reason)
                        .await?;
                    warn!(cc_pair_id = drained.resource_id, attempt_id = attempt_id, reason = %reason, "Indexing attempt failed");
                    Ok(FinalizeOutcome::AttemptFailed { reason })
                }
            },
        }
    }

    async fn prepare_driver(&self, resource_id: ResourceId) -> OrchestrationResult<Option<i64>> {
        let attempt_id = self.relational.create_index_attempt(resource_id).await?;
        Ok(Some(attempt_id))
    }

    async fn on_orphaned(
        &self,
        resource_id: ResourceId,
        payload: &CampaignPayload,
        reason: &str,
    ) -> OrchestrationResult<()> {
        let Some(attempt_id) = payload.index_attempt_id else {
            return Ok(());
        };
        match self.relational.index_attempt(attempt_id).await? {
            Some(attempt) if !attempt.status.is_terminal() => {
                self.relational
                    .mark_attempt_failed(attempt_id, reason)
                    .await?;
                warn!(cc_pair_id = resource_id, attempt_id = attempt_id, reason = %reason, "Orphaned index attempt marked failed");
            }
            _ => {}
        }
        Ok(())
    }

    async fn abandoned(&self, _resource_id: ResourceId, payload: &CampaignPayload) -> OrchestrationResult<bool> {
        let Some(attempt_id) = payload.index_attempt_id else {
            return Ok(false);
        };
        Ok(match self.relational.index_attempt(attempt_id).await? {
            Some(attempt) => attempt.status.is_terminal(),
            None => true,
        })
    }
}
