//! In-memory collaborators for tests and single-process runs
//!
//! `InMemoryRelationalStore` keeps just enough of the relational model for the
//! campaigns to exercise real state changes. Every operation can be made to
//! fail by name with [`InMemoryRelationalStore::fail_on`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::document_source::DocumentSource;
use super::relational::{
    CcPairId, DocumentSyncFields, IndexAttempt, IndexAttemptStatus, MembershipKind,
    RelationalStore,
};
use super::vector_index::VectorIndex;
use crate::campaign::ResourceId;
use crate::error::{OrchestrationError, OrchestrationResult};

#[derive(Debug, Clone, Default)]
struct DocumentRow {
    cc_pairs: BTreeSet<CcPairId>,
    access: BTreeSet<String>,
    hidden: bool,
    needs_sync: bool,
}

#[derive(Debug, Clone, Default)]
struct MembershipRow {
    members: BTreeSet<String>,
    unsynced: BTreeSet<String>,
    synced: bool,
    pending_deletion: bool,
}

#[derive(Debug, Clone, Default)]
struct CcPairRow {
    pending_deletion: bool,
    due_for_pruning: bool,
    due_for_indexing: bool,
    last_pruned: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct RelationalState {
    documents: BTreeMap<String, DocumentRow>,
    memberships: BTreeMap<(MembershipKind, ResourceId), MembershipRow>,
    cc_pairs: BTreeMap<CcPairId, CcPairRow>,
    attempts: BTreeMap<i64, IndexAttempt>,
    next_attempt_id: i64,
    failing: HashSet<String>,
}

impl RelationalState {
    fn check(&self, operation: &str) -> OrchestrationResult<()> {
        if self.failing.contains(operation) {
            return Err(OrchestrationError::relational(operation, "injected failure"));
        }
        Ok(())
    }

    fn attempt_mut(&mut self, attempt_id: i64) -> OrchestrationResult<&mut IndexAttempt> {
        self.attempts.get_mut(&attempt_id).ok_or_else(|| {
            OrchestrationError::relational("index_attempt", format!("attempt {attempt_id} not found"))
        })
    }

    fn set_attempt_status(
        &mut self,
        attempt_id: i64,
        status: IndexAttemptStatus,
        reason: Option<&str>,
    ) -> OrchestrationResult<()> {
        let attempt = self.attempt_mut(attempt_id)?;
        attempt.status = status;
        if let Some(reason) = reason {
            attempt.failure_reason = Some(reason.to_string());
        }
        attempt.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRelationalStore {
    state: Mutex<RelationalState>,
}

impl InMemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cc_pair(&self, cc_pair_id: CcPairId) {
        self.state.lock().cc_pairs.entry(cc_pair_id).or_default();
    }

    /// Insert (or attach) a document to a pair
    pub fn add_document(&self, document_id: &str, cc_pair_id: CcPairId) {
        let mut state = self.state.lock();
        state.cc_pairs.entry(cc_pair_id).or_default();
        state
            .documents
            .entry(document_id.to_string())
            .or_default()
            .cc_pairs
            .insert(cc_pair_id);
    }

    pub fn mark_document_stale(&self, document_id: &str) {
        if let Some(row) = self.state.lock().documents.get_mut(document_id) {
            row.needs_sync = true;
        }
    }

    pub fn set_document_access(&self, document_id: &str, access: &[&str]) {
        if let Some(row) = self.state.lock().documents.get_mut(document_id) {
            row.access = access.iter().map(|entry| entry.to_string()).collect();
        }
    }

    /// Create a membership whose members are all unsynced
    pub fn add_membership(&self, kind: MembershipKind, id: ResourceId, members: &[&str]) {
        let members: BTreeSet<String> = members.iter().map(|member| member.to_string()).collect();
        self.state.lock().memberships.insert(
            (kind, id),
            MembershipRow {
                unsynced: members.clone(),
                members,
                synced: false,
                pending_deletion: false,
            },
        );
    }

    pub fn mark_membership_for_deletion(&self, kind: MembershipKind, id: ResourceId) {
        if let Some(row) = self.state.lock().memberships.get_mut(&(kind, id)) {
            row.pending_deletion = true;
            row.synced = false;
        }
    }

    pub fn mark_cc_pair_for_deletion(&self, cc_pair_id: CcPairId) {
        self.state
            .lock()
            .cc_pairs
            .entry(cc_pair_id)
            .or_default()
            .pending_deletion = true;
    }

    pub fn set_due_for_pruning(&self, cc_pair_id: CcPairId, due: bool) {
        self.state
            .lock()
            .cc_pairs
            .entry(cc_pair_id)
            .or_default()
            .due_for_pruning = due;
    }

    pub fn set_due_for_indexing(&self, cc_pair_id: CcPairId, due: bool) {
        self.state
            .lock()
            .cc_pairs
            .entry(cc_pair_id)
            .or_default()
            .due_for_indexing = due;
    }

    /// Make the named trait operation fail until [`clear_failures`](Self::clear_failures)
    pub fn fail_on(&self, operation: &str) {
        self.state.lock().failing.insert(operation.to_string());
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    pub fn document_exists(&self, document_id: &str) -> bool {
        self.state.lock().documents.contains_key(document_id)
    }

    pub fn document_needs_sync(&self, document_id: &str) -> bool {
        self.state
            .lock()
            .documents
            .get(document_id)
            .is_some_and(|row| row.needs_sync)
    }

    pub fn document_cc_pairs(&self, document_id: &str) -> Vec<CcPairId> {
        self.state
            .lock()
            .documents
            .get(document_id)
            .map(|row| row.cc_pairs.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn membership_exists(&self, kind: MembershipKind, id: ResourceId) -> bool {
        self.state.lock().memberships.contains_key(&(kind, id))
    }

    pub fn membership_synced(&self, kind: MembershipKind, id: ResourceId) -> bool {
        self.state
            .lock()
            .memberships
            .get(&(kind, id))
            .is_some_and(|row| row.synced)
    }

    pub fn cc_pair_exists(&self, cc_pair_id: CcPairId) -> bool {
        self.state.lock().cc_pairs.contains_key(&cc_pair_id)
    }

    pub fn last_pruned(&self, cc_pair_id: CcPairId) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .cc_pairs
            .get(&cc_pair_id)
            .and_then(|row| row.last_pruned)
    }

    pub fn attempt(&self, attempt_id: i64) -> Option<IndexAttempt> {
        self.state.lock().attempts.get(&attempt_id).cloned()
    }

    pub fn attempts_for(&self, cc_pair_id: CcPairId) -> Vec<IndexAttempt> {
        self.state
            .lock()
            .attempts
            .values()
            .filter(|attempt| attempt.cc_pair_id == cc_pair_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RelationalStore for InMemoryRelationalStore {
    async fn cc_pairs_with_stale_documents(&self) -> OrchestrationResult<Vec<CcPairId>> {
        let state = self.state.lock();
        state.check("cc_pairs_with_stale_documents")?;
        let pairs: BTreeSet<CcPairId> = state
            .documents
            .values()
            .filter(|row| row.needs_sync)
            .flat_map(|row| row.cc_pairs.iter().copied())
            .filter(|cc_pair_id| {
                state
                    .cc_pairs
                    .get(cc_pair_id)
                    .is_some_and(|row| !row.pending_deletion)
            })
            .collect();
        Ok(pairs.into_iter().collect())
    }

    async fn stale_documents(&self, cc_pair_id: CcPairId) -> OrchestrationResult<Vec<String>> {
        let state = self.state.lock();
        state.check("stale_documents")?;
        Ok(state
            .documents
            .iter()
            .filter(|(_, row)| row.needs_sync && row.cc_pairs.contains(&cc_pair_id))
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn memberships_needing_sync(&self, kind: MembershipKind) -> OrchestrationResult<Vec<ResourceId>> {
        let state = self.state.lock();
        state.check("memberships_needing_sync")?;
        Ok(state
            .memberships
            .iter()
            .filter(|((row_kind, _), row)| *row_kind == kind && !row.synced)
            .map(|((_, id), _)| *id)
            .collect())
    }

    async fn membership_unsynced_documents(
        &self,
        kind: MembershipKind,
        id: ResourceId,
    ) -> OrchestrationResult<Vec<String>> {
        let state = self.state.lock();
        state.check("membership_unsynced_documents")?;
        let Some(row) = state.memberships.get(&(kind, id)) else {
            return Ok(Vec::new());
        };
        // A set pending deletion has to be removed from every member's index entry
        let documents = if row.pending_deletion {
            &row.members
        } else {
            &row.unsynced
        };
        Ok(documents
            .iter()
            .filter(|document_id| state.documents.contains_key(*document_id))
            .cloned()
            .collect())
    }

    async fn membership_pending_deletion(&self, kind: MembershipKind, id: ResourceId) -> OrchestrationResult<bool> {
        let state = self.state.lock();
        state.check("membership_pending_deletion")?;
        Ok(state
            .memberships
            .get(&(kind, id))
            .is_some_and(|row| row.pending_deletion))
    }

    async fn mark_membership_synced(&self, kind: MembershipKind, id: ResourceId) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("mark_membership_synced")?;
        if let Some(row) = state.memberships.get_mut(&(kind, id)) {
            row.synced = true;
            row.unsynced.clear();
        }
        Ok(())
    }

    async fn delete_membership(&self, kind: MembershipKind, id: ResourceId) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("delete_membership")?;
        state.memberships.remove(&(kind, id));
        Ok(())
    }

    async fn cc_pairs_pending_deletion(&self) -> OrchestrationResult<Vec<CcPairId>> {
        let state = self.state.lock();
        state.check("cc_pairs_pending_deletion")?;
        Ok(state
            .cc_pairs
            .iter()
            .filter(|(_, row)| row.pending_deletion)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn cc_pair_documents(&self, cc_pair_id: CcPairId) -> OrchestrationResult<Vec<String>> {
        let state = self.state.lock();
        state.check("cc_pair_documents")?;
        Ok(state
            .documents
            .iter()
            .filter(|(_, row)| row.cc_pairs.contains(&cc_pair_id))
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn delete_cc_pair_cascade(&self, cc_pair_id: CcPairId) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("delete_cc_pair_cascade")?;
        state.cc_pairs.remove(&cc_pair_id);
        for row in state.documents.values_mut() {
            row.cc_pairs.remove(&cc_pair_id);
        }
        state.documents.retain(|_, row| !row.cc_pairs.is_empty());
        state
            .attempts
            .retain(|_, attempt| attempt.cc_pair_id != cc_pair_id);
        Ok(())
    }

    async fn cc_pairs_due_for_pruning(&self) -> OrchestrationResult<Vec<CcPairId>> {
        let state = self.state.lock();
        state.check("cc_pairs_due_for_pruning")?;
        Ok(state
            .cc_pairs
            .iter()
            .filter(|(_, row)| row.due_for_pruning && !row.pending_deletion)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn mark_cc_pair_pruned(&self, cc_pair_id: CcPairId) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("mark_cc_pair_pruned")?;
        if let Some(row) = state.cc_pairs.get_mut(&cc_pair_id) {
            row.due_for_pruning = false;
            row.last_pruned = Some(Utc::now());
        }
        Ok(())
    }

    async fn cc_pairs_due_for_indexing(&self) -> OrchestrationResult<Vec<CcPairId>> {
        let state = self.state.lock();
        state.check("cc_pairs_due_for_indexing")?;
        Ok(state
            .cc_pairs
            .iter()
            .filter(|(_, row)| row.due_for_indexing && !row.pending_deletion)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn create_index_attempt(&self, cc_pair_id: CcPairId) -> OrchestrationResult<i64> {
        let mut state = self.state.lock();
        state.check("create_index_attempt")?;
        state.next_attempt_id += 1;
        let id = state.next_attempt_id;
        let now = Utc::now();
        state.attempts.insert(
            id,
            IndexAttempt {
                id,
                cc_pair_id,
                status: IndexAttemptStatus::NotStarted,
                failure_reason: None,
                created_at: now,
                updated_at: now,
            },
        );
        if let Some(row) = state.cc_pairs.get_mut(&cc_pair_id) {
            row.due_for_indexing = false;
        }
        Ok(id)
    }

    async fn index_attempt(&self, attempt_id: i64) -> OrchestrationResult<Option<IndexAttempt>> {
        let state = self.state.lock();
        state.check("index_attempt")?;
        Ok(state.attempts.get(&attempt_id).cloned())
    }

    async fn mark_attempt_in_progress(&self, attempt_id: i64) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("mark_attempt_in_progress")?;
        state.set_attempt_status(attempt_id, IndexAttemptStatus::InProgress, None)
    }

    async fn mark_attempt_succeeded(&self, attempt_id: i64) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("mark_attempt_succeeded")?;
        state.set_attempt_status(attempt_id, IndexAttemptStatus::Succeeded, None)
    }

    async fn mark_attempt_failed(&self, attempt_id: i64, reason: &str) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("mark_attempt_failed")?;
        state.set_attempt_status(attempt_id, IndexAttemptStatus::Failed, Some(reason))
    }

    async fn mark_attempt_canceled(&self, attempt_id: i64, reason: &str) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("mark_attempt_canceled")?;
        state.set_attempt_status(attempt_id, IndexAttemptStatus::Canceled, Some(reason))
    }

    async fn document_sync_fields(&self, document_id: &str) -> OrchestrationResult<Option<DocumentSyncFields>> {
        let state = self.state.lock();
        state.check("document_sync_fields")?;
        let Some(row) = state.documents.get(document_id) else {
            return Ok(None);
        };
        let names_for = |kind: MembershipKind| -> BTreeSet<String> {
            state
                .memberships
                .iter()
                .filter(|((row_kind, _), membership)| {
                    *row_kind == kind
                        && !membership.pending_deletion
                        && membership.members.contains(document_id)
                })
                .map(|((_, id), _)| id.to_string())
                .collect()
        };
        Ok(Some(DocumentSyncFields {
            document_sets: names_for(MembershipKind::DocumentSet),
            user_groups: names_for(MembershipKind::UserGroup),
            access: row.access.clone(),
            hidden: row.hidden,
        }))
    }

    async fn mark_document_synced(&self, document_id: &str) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("mark_document_synced")?;
        if let Some(row) = state.documents.get_mut(document_id) {
            row.needs_sync = false;
        }
        Ok(())
    }

    async fn document_cc_pair_count(&self, document_id: &str) -> OrchestrationResult<u64> {
        let state = self.state.lock();
        state.check("document_cc_pair_count")?;
        Ok(state
            .documents
            .get(document_id)
            .map(|row| row.cc_pairs.len() as u64)
            .unwrap_or(0))
    }

    async fn delete_document(&self, document_id: &str) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("delete_document")?;
        state.documents.remove(document_id);
        for membership in state.memberships.values_mut() {
            membership.members.remove(document_id);
            membership.unsynced.remove(document_id);
        }
        Ok(())
    }

    async fn detach_document(&self, document_id: &str, cc_pair_id: CcPairId) -> OrchestrationResult<()> {
        let mut state = self.state.lock();
        state.check("detach_document")?;
        if let Some(row) = state.documents.get_mut(document_id) {
            row.cc_pairs.remove(&cc_pair_id);
        }
        Ok(())
    }
}

/// Source listing backed by a map of pair -> document ids
#[derive(Debug, Default)]
pub struct InMemoryDocumentSource {
    documents: Mutex<HashMap<CcPairId, Vec<String>>>,
    failing: Mutex<HashSet<CcPairId>>,
}

impl InMemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_documents(&self, cc_pair_id: CcPairId, document_ids: &[&str]) {
        self.documents.lock().insert(
            cc_pair_id,
            document_ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    pub fn fail_for(&self, cc_pair_id: CcPairId) {
        self.failing.lock().insert(cc_pair_id);
    }
}

#[async_trait]
impl DocumentSource for InMemoryDocumentSource {
    async fn list_document_ids(&self, cc_pair_id: CcPairId) -> OrchestrationResult<Vec<String>> {
        if self.failing.lock().contains(&cc_pair_id) {
            return Err(OrchestrationError::relational(
                "list_document_ids",
                format!("source for cc_pair {cc_pair_id} is unreachable"),
            ));
        }
        Ok(self
            .documents
            .lock()
            .get(&cc_pair_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Records every index write
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    fields: Mutex<BTreeMap<String, DocumentSyncFields>>,
    update_counts: Mutex<HashMap<String, usize>>,
    deleted: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_document(&self, document_id: &str) {
        self.failing.lock().insert(document_id.to_string());
    }

    pub fn fields(&self, document_id: &str) -> Option<DocumentSyncFields> {
        self.fields.lock().get(document_id).cloned()
    }

    pub fn update_count(&self, document_id: &str) -> usize {
        self.update_counts
            .lock()
            .get(document_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }

    fn check(&self, document_id: &str) -> OrchestrationResult<()> {
        if self.failing.lock().contains(document_id) {
            return Err(OrchestrationError::relational(
                "vector_index",
                format!("index write for {document_id} rejected"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn update_by_id(&self, document_id: &str, fields: &DocumentSyncFields) -> OrchestrationResult<()> {
        self.check(document_id)?;
        self.fields
            .lock()
            .insert(document_id.to_string(), fields.clone());
        *self
            .update_counts
            .lock()
            .entry(document_id.to_string())
            .or_default() += 1;
        Ok(())
    }

    async fn delete_by_id(&self, document_id: &str) -> OrchestrationResult<()> {
        self.check(document_id)?;
        self.fields.lock().remove(document_id);
        self.deleted.lock().push(document_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_membership_fields_follow_pending_deletion() {
        let store = InMemoryRelationalStore::new();
        store.add_document("doc-1", 1);
        store.add_membership(MembershipKind::DocumentSet, 10, &["doc-1"]);

        let fields = store.document_sync_fields("doc-1").await.unwrap().unwrap();
        assert!(fields.document_sets.contains("10"));

        store.mark_membership_for_deletion(MembershipKind::DocumentSet, 10);
        let fields = store.document_sync_fields("doc-1").await.unwrap().unwrap();
        assert!(fields.document_sets.is_empty());
        assert_eq!(
            store
                .membership_unsynced_documents(MembershipKind::DocumentSet, 10)
                .await
                .unwrap(),
            vec!["doc-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemoryRelationalStore::new();
        store.fail_on("cc_pairs_pending_deletion");
        assert!(store.cc_pairs_pending_deletion().await.is_err());
        store.clear_failures();
        assert!(store.cc_pairs_pending_deletion().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cascade_keeps_shared_documents() {
        let store = InMemoryRelationalStore::new();
        store.add_document("shared", 1);
        store.add_document("shared", 2);
        store.add_document("own", 1);

        store.delete_cc_pair_cascade(1).await.unwrap();
        assert!(!store.cc_pair_exists(1));
        assert!(store.document_exists("shared"));
        assert!(!store.document_exists("own"));
    }
}
