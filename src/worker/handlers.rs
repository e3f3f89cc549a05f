//! Built-in work unit handlers

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::dispatcher::{TaskOutcome, WorkUnit, WorkUnitHandler};
use crate::campaign::Campaign;
use crate::collaborators::{RelationalStore, VectorIndex};
use crate::constants::task_names;
use crate::error::{OrchestrationError, OrchestrationResult};
use crate::indexing::{IndexingRunOutcome, IndexingSupervisor};
use crate::orchestration::{DriverArgs, Generator};

/// Pushes one document's current memberships and access to the vector index
#[derive(Debug)]
pub struct DocumentMetadataSyncHandler {
    relational: Arc<dyn RelationalStore>,
    index: Arc<dyn VectorIndex>,
}

impl DocumentMetadataSyncHandler {
    pub fn new(relational: Arc<dyn RelationalStore>, index: Arc<dyn VectorIndex>) -> Self {
        Self { relational, index }
    }
}

#[async_trait]
impl WorkUnitHandler for DocumentMetadataSyncHandler {
    fn task_name(&self) -> &str {
        task_names::DOCUMENT_METADATA_SYNC
    }

    async fn handle(&self, unit: &WorkUnit) -> OrchestrationResult<TaskOutcome> {
        let document_id = unit.document_id()?;
        let Some(fields) = self.relational.document_sync_fields(document_id).await? else {
            debug!(document_id = document_id, "Document gone before sync; nothing to push");
            return Ok(TaskOutcome::Succeeded);
        };

        // Index outages are transient; the unit keeps its task set entry
        if let Err(e) = self.index.update_by_id(document_id, &fields).await {
            return Ok(TaskOutcome::retry(e.to_string()));
        }
        self.relational.mark_document_synced(document_id).await?;
        Ok(TaskOutcome::Succeeded)
    }
}

/// Removes one document from a connector/credential pair.
///
/// A document owned by no other pair is deleted from the index and the store;
/// a shared one is detached from this pair and its index entry refreshed.
#[derive(Debug)]
pub struct DocumentCleanupHandler {
    relational: Arc<dyn RelationalStore>,
    index: Arc<dyn VectorIndex>,
}

impl DocumentCleanupHandler {
    pub fn new(relational: Arc<dyn RelationalStore>, index: Arc<dyn VectorIndex>) -> Self {
        Self { relational, index }
    }
}

#[async_trait]
impl WorkUnitHandler for DocumentCleanupHandler {
    fn task_name(&self) -> &str {
        task_names::DOCUMENT_BY_CC_PAIR_CLEANUP
    }

    async fn handle(&self, unit: &WorkUnit) -> OrchestrationResult<TaskOutcome> {
        let document_id = unit.document_id()?;
        let campaign = unit.campaign().ok_or_else(|| {
            OrchestrationError::InvalidArguments(format!("cleanup task {} carries no campaign", unit.task_id))
        })?;
        let cc_pair_id = campaign.resource_id;

        let owners = self.relational.document_cc_pair_count(document_id).await?;
        if owners <= 1 {
            if let Err(e) = self.index.delete_by_id(document_id).await {
                return Ok(TaskOutcome::retry(e.to_string()));
            }
            self.relational.delete_document(document_id).await?;
            debug!(document_id = document_id, cc_pair_id = cc_pair_id, "Document deleted");
            return Ok(TaskOutcome::Succeeded);
        }

        self.relational.detach_document(document_id, cc_pair_id).await?;
        if let Some(fields) = self.relational.document_sync_fields(document_id).await? {
            if let Err(e) = self.index.update_by_id(document_id, &fields).await {
                return Ok(TaskOutcome::retry(e.to_string()));
            }
        }
        debug!(document_id = document_id, cc_pair_id = cc_pair_id, remaining_owners = owners - 1, "Document detached");
        Ok(TaskOutcome::Succeeded)
    }
}

/// Runs the pruning driver body
#[derive(Debug)]
pub struct PruningGeneratorHandler {
    generator: Generator,
    campaign: Arc<dyn Campaign>,
}

impl PruningGeneratorHandler {
    pub fn new(generator: Generator, campaign: Arc<dyn Campaign>) -> Self {
        Self { generator, campaign }
    }
}

#[async_trait]
impl WorkUnitHandler for PruningGeneratorHandler {
    fn task_name(&self) -> &str {
        task_names::CONNECTOR_PRUNING_GENERATOR
    }

    async fn handle(&self, unit: &WorkUnit) -> OrchestrationResult<TaskOutcome> {
        let args: DriverArgs = unit.parse_args()?;
        match self
            .generator
            .run_driver(self.campaign.as_ref(), args.resource_id, &args.driver_task_id)
            .await
        {
            Ok(emitted) => {
                info!(cc_pair_id = args.resource_id, emitted = emitted, "Pruning generator finished");
                Ok(TaskOutcome::Succeeded)
            }
            Err(e) => {
                warn!(cc_pair_id = args.resource_id, error = %e, "Pruning generator stopped");
                Ok(TaskOutcome::failed(e.to_string()))
            }
        }
    }
}

/// Supervises one indexing run
#[derive(Debug)]
pub struct IndexingProxyHandler {
    supervisor: IndexingSupervisor,
}

impl IndexingProxyHandler {
    pub fn new(supervisor: IndexingSupervisor) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl WorkUnitHandler for IndexingProxyHandler {
    fn task_name(&self) -> &str {
        task_names::CONNECTOR_INDEXING_PROXY
    }

    async fn handle(&self, unit: &WorkUnit) -> OrchestrationResult<TaskOutcome> {
        let args: DriverArgs = unit.parse_args()?;
        let attempt_id = args.index_attempt_id.ok_or_else(|| {
            OrchestrationError::InvalidArguments(format!(
                "indexing driver {} carries no index attempt",
                args.driver_task_id
            ))
        })?;

        Ok(
            match self
                .supervisor
                .run(args.resource_id, attempt_id, &args.driver_task_id)
                .await?
            {
                IndexingRunOutcome::Succeeded => TaskOutcome::Succeeded,
                IndexingRunOutcome::Failed { reason } => TaskOutcome::Failed { reason },
                IndexingRunOutcome::Canceled => TaskOutcome::failed("canceled"),
            },
        )
    }
}
