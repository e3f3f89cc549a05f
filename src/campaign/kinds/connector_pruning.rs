//! Pruning: remove indexed documents the source no longer has
//!
//! Driven by the pruning generator task, which may still be discovering work
//! after the first cleanup units finished. Finalization therefore waits for
//! the Generator Complete Signal as well as an empty task set.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::campaign::{Campaign, CampaignKind, DrainedCampaign, FinalizeOutcome, ResourceId, WorkItem};
use crate::collaborators::{DocumentSource, RelationalStore};
use crate::constants::completion;
use crate::error::OrchestrationResult;

#[derive(Debug)]
pub struct ConnectorPruningCampaign {
    relational: Arc<dyn RelationalStore>,
    source: Arc<dyn DocumentSource>,
}

impl ConnectorPruningCampaign {
    pub fn new(relational: Arc<dyn RelationalStore>, source: Arc<dyn DocumentSource>) -> Self {
        Self { relational, source }
    }
}

#[async_trait]
impl Campaign for ConnectorPruningCampaign {
    fn kind(&self) -> CampaignKind {
        CampaignKind::ConnectorPruning
    }

    async fn resources_due(&self) -> OrchestrationResult<Vec<ResourceId>> {
        self.relational.cc_pairs_due_for_pruning().await
    }

    async fn enumerate_work(&self, resource_id: ResourceId) -> OrchestrationResult<Vec<WorkItem>> {
        let in_source: HashSet<String> = self
            .source
            .list_document_ids(resource_id)
            .await?
            .into_iter()
            .collect();

        Ok(self
            .relational
            .cc_pair_documents(resource_id)
            .await?
            .into_iter()
            .filter(|document_id| !in_source.contains(document_id))
            .map(WorkItem::document)
            .collect())
    }

    async fn finalize(&self, drained: &DrainedCampaign) -> OrchestrationResult<FinalizeOutcome> {
        match drained.completion {
            Some(code) if completion::is_ok(code) => {
                self.relational
                    .mark_cc_pair_pruned(drained.resource_id)
                    .await?;
                info!(
                    cc_pair_id = drained.resource_id,
                    pruned = drained.expected,
                    "Pruning finished"
                );
                Ok(FinalizeOutcome::Pruned)
            }
            code => {
                warn!(
                    cc_pair_id = drained.resource_id,
                    completion = ?code,
                    "Pruning generator did not finish cleanly; pair stays due"
                );
                Ok(FinalizeOutcome::Skipped {
                    reason: format!("generator completion code {code:?}"),
                })
            }
        }
    }
}
