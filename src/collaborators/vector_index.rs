//! Vector index collaborator
//!
//! Only work-unit handlers call into the index; the orchestration layer never
//! does.

use async_trait::async_trait;

use super::relational::DocumentSyncFields;
use crate::error::OrchestrationResult;

#[async_trait]
pub trait VectorIndex: Send + Sync + std::fmt::Debug + 'static {
    /// Overwrite the metadata fields of every chunk of a document
    async fn update_by_id(&self, document_id: &str, fields: &DocumentSyncFields) -> OrchestrationResult<()>;

    /// Remove every chunk of a document
    async fn delete_by_id(&self, document_id: &str) -> OrchestrationResult<()>;
}
