//! Relational store collaborator
//!
//! The durable side of every campaign: which resources need work, their
//! status fields, cascading deletes and index attempt records.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::campaign::ResourceId;
use crate::error::OrchestrationResult;

/// Connector/credential pair id
pub type CcPairId = ResourceId;

/// Which membership table a sync campaign targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipKind {
    DocumentSet,
    UserGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexAttemptStatus {
    NotStarted,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl IndexAttemptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            IndexAttemptStatus::Succeeded | IndexAttemptStatus::Failed | IndexAttemptStatus::Canceled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexAttempt {
    pub id: i64,
    pub cc_pair_id: CcPairId,
    pub status: IndexAttemptStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the metadata sync pushes to the vector index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSyncFields {
    pub document_sets: BTreeSet<String>,
    pub user_groups: BTreeSet<String>,
    pub access: BTreeSet<String>,
    pub hidden: bool,
}

#[async_trait]
pub trait RelationalStore: Send + Sync + std::fmt::Debug + 'static {
    // Connector metadata sync

    /// Pairs owning at least one document flagged as needing sync
    async fn cc_pairs_with_stale_documents(&self) -> OrchestrationResult<Vec<CcPairId>>;

    async fn stale_documents(&self, cc_pair_id: CcPairId) -> OrchestrationResult<Vec<String>>;

    // Document set / user group sync

    async fn memberships_needing_sync(&self, kind: MembershipKind) -> OrchestrationResult<Vec<ResourceId>>;

    /// Members whose index entry does not yet reflect the membership
    async fn membership_unsynced_documents(
        &self,
        kind: MembershipKind,
        id: ResourceId,
    ) -> OrchestrationResult<Vec<String>>;

    async fn membership_pending_deletion(&self, kind: MembershipKind, id: ResourceId) -> OrchestrationResult<bool>;

    async fn mark_membership_synced(&self, kind: MembershipKind, id: ResourceId) -> OrchestrationResult<()>;

    async fn delete_membership(&self, kind: MembershipKind, id: ResourceId) -> OrchestrationResult<()>;

    // Connector deletion

    async fn cc_pairs_pending_deletion(&self) -> OrchestrationResult<Vec<CcPairId>>;

    async fn cc_pair_documents(&self, cc_pair_id: CcPairId) -> OrchestrationResult<Vec<String>>;

    /// Delete the pair and every row that hangs off it
    async fn delete_cc_pair_cascade(&self, cc_pair_id: CcPairId) -> OrchestrationResult<()>;

    // Pruning

    async fn cc_pairs_due_for_pruning(&self) -> OrchestrationResult<Vec<CcPairId>>;

    async fn mark_cc_pair_pruned(&self, cc_pair_id: CcPairId) -> OrchestrationResult<()>;

    // Indexing

    async fn cc_pairs_due_for_indexing(&self) -> OrchestrationResult<Vec<CcPairId>>;

    async fn create_index_attempt(&self, cc_pair_id: CcPairId) -> OrchestrationResult<i64>;

    async fn index_attempt(&self, attempt_id: i64) -> OrchestrationResult<Option<IndexAttempt>>;

    async fn mark_attempt_in_progress(&self, attempt_id: i64) -> OrchestrationResult<()>;

    async fn mark_attempt_succeeded(&self, attempt_id: i64) -> OrchestrationResult<()>;

    async fn mark_attempt_failed(&self, attempt_id: i64, reason: &str) -> OrchestrationResult<()>;

    async fn mark_attempt_canceled(&self, attempt_id: i64, reason: &str) -> OrchestrationResult<()>;

    // Per-document work units

    async fn document_sync_fields(&self, document_id: &str) -> OrchestrationResult<Option<DocumentSyncFields>>;

    async fn mark_document_synced(&self, document_id: &str) -> OrchestrationResult<()>;

    /// Number of pairs that still reference the document
    async fn document_cc_pair_count(&self, document_id: &str) -> OrchestrationResult<u64>;

    async fn delete_document(&self, document_id: &str) -> OrchestrationResult<()>;

    /// Drop one pair's reference to a document shared with other pairs
    async fn detach_document(&self, document_id: &str, cc_pair_id: CcPairId) -> OrchestrationResult<()>;
}
