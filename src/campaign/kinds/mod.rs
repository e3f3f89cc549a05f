//! One [`Campaign`](super::Campaign) implementation per campaign kind

pub mod connector_deletion;
pub mod connector_indexing;
pub mod connector_pruning;
pub mod connector_sync;
pub mod membership_sync;

pub use connector_deletion::ConnectorDeletionCampaign;
pub use connector_indexing::ConnectorIndexingCampaign;
pub use connector_pruning::ConnectorPruningCampaign;
pub use connector_sync::ConnectorSyncCampaign;
pub use membership_sync::MembershipSyncCampaign;
