//! Source-side document listing used by pruning

use async_trait::async_trait;

use super::relational::CcPairId;
use crate::error::OrchestrationResult;

#[async_trait]
pub trait DocumentSource: Send + Sync + std::fmt::Debug + 'static {
    /// Ids of every document the source currently holds for the pair
    async fn list_document_ids(&self, cc_pair_id: CcPairId) -> OrchestrationResult<Vec<String>>;
}
