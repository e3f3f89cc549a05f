//! # Campaign Registry
//!
//! Maps each [`CampaignKind`] to the [`Campaign`] implementation serving it.
//! Generators, the monitor, the watchdog and the scheduler iterate the
//! registry in `CampaignKind::ALL` order so every pass visits kinds
//! deterministically.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use docsync_orchestrator::collaborators::{InMemoryDocumentSource, InMemoryRelationalStore};
//! use docsync_orchestrator::campaign::CampaignKind;
//! use docsync_orchestrator::orchestration::CampaignRegistry;
//!
//! let registry = CampaignRegistry::with_default_campaigns(
//!     Arc::new(InMemoryRelationalStore::new()),
//!     Arc::new(InMemoryDocumentSource::new()),
//! );
//! assert_eq!(registry.len(), 6);
//! assert!(registry.get(CampaignKind::ConnectorPruning).is_some());
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::campaign::kinds::{
    ConnectorDeletionCampaign, ConnectorIndexingCampaign, ConnectorPruningCampaign,
    ConnectorSyncCampaign, MembershipSyncCampaign,
};
use crate::campaign::{Campaign, CampaignKind};
use crate::collaborators::{DocumentSource, RelationalStore};

#[derive(Debug, Clone, Default)]
pub struct CampaignRegistry {
    campaigns: BTreeMap<CampaignKind, Arc<dyn Campaign>>,
}

impl CampaignRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in kind wired to the given collaborators
    pub fn with_default_campaigns(
        relational: Arc<dyn RelationalStore>,
        source: Arc<dyn DocumentSource>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ConnectorSyncCampaign::new(relational.clone())));
        registry.register(Arc::new(MembershipSyncCampaign::document_sets(relational.clone())));
        registry.register(Arc::new(MembershipSyncCampaign::user_groups(relational.clone())));
        registry.register(Arc::new(ConnectorDeletionCampaign::new(relational.clone())));
        registry.register(Arc::new(ConnectorPruningCampaign::new(relational.clone(), source)));
        registry.register(Arc::new(ConnectorIndexingCampaign::new(relational)));
        registry
    }

    /// Register (or replace) the campaign for its kind
    pub fn register(&mut self, campaign: Arc<dyn Campaign>) -> Option<Arc<dyn Campaign>> {
        let kind = campaign.kind();
        debug!(kind = %kind, "Registering campaign");
        self.campaigns.insert(kind, campaign)
    }

    pub fn get(&self, kind: CampaignKind) -> Option<Arc<dyn Campaign>> {
        self.campaigns.get(&kind).cloned()
    }

    pub fn campaigns(&self) -> impl Iterator<Item = &Arc<dyn Campaign>> {
        self.campaigns.values()
    }

    pub fn kinds(&self) -> Vec<CampaignKind> {
        self.campaigns.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryDocumentSource, InMemoryRelationalStore};

    #[test]
    fn test_iteration_follows_kind_order() {
        let registry = CampaignRegistry::with_default_campaigns(
            Arc::new(InMemoryRelationalStore::new()),
            Arc::new(InMemoryDocumentSource::new()),
        );
        assert_eq!(registry.kinds(), CampaignKind::ALL.to_vec());
    }

    #[test]
    fn test_register_replaces_same_kind() {
        let relational: Arc<dyn RelationalStore> = Arc::new(InMemoryRelationalStore::new());
        let mut registry = CampaignRegistry::new();
        assert!(registry
            .register(Arc::new(ConnectorSyncCampaign::new(relational.clone())))
            .is_none());
        assert!(registry
            .register(Arc::new(ConnectorSyncCampaign::new(relational)))
            .is_some());
        assert_eq!(registry.len(), 1);
    }
}
