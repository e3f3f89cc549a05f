//! Campaign kinds and their static properties

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{queues, task_names, TaskPriority};

/// How a kind stores its fence value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStyle {
    /// Bare integer: the expected work-unit count
    Count,
    /// JSON [`CampaignPayload`](super::CampaignPayload)
    Payload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignKind {
    /// Push stale document metadata for one connector/credential pair
    ConnectorSync,
    /// Propagate a document-set membership change
    DocumentSetSync,
    /// Propagate a user-group membership change
    UserGroupSync,
    /// Remove every document of a connector/credential pair, then the pair itself
    ConnectorDeletion,
    /// Remove documents that disappeared from the source
    ConnectorPruning,
    /// One supervised indexing run
    ConnectorIndexing,
}

impl CampaignKind {
    pub const ALL: [CampaignKind; 6] = [
        CampaignKind::ConnectorSync,
        CampaignKind::DocumentSetSync,
        CampaignKind::UserGroupSync,
        CampaignKind::ConnectorDeletion,
        CampaignKind::ConnectorPruning,
        CampaignKind::ConnectorIndexing,
    ];

    pub fn key_prefix(self) -> &'static str {
        match self {
            CampaignKind::ConnectorSync => "connectorsync",
            CampaignKind::DocumentSetSync => "documentset",
            CampaignKind::UserGroupSync => "usergroup",
            CampaignKind::ConnectorDeletion => "connectordeletion",
            CampaignKind::ConnectorPruning => "connectorpruning",
            CampaignKind::ConnectorIndexing => "connectorindexing",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key_prefix() == prefix)
    }

    pub fn fence_style(self) -> FenceStyle {
        match self {
            CampaignKind::ConnectorSync
            | CampaignKind::DocumentSetSync
            | CampaignKind::UserGroupSync => FenceStyle::Count,
            CampaignKind::ConnectorDeletion
            | CampaignKind::ConnectorPruning
            | CampaignKind::ConnectorIndexing => FenceStyle::Payload,
        }
    }

    /// Whether the campaign is started by submitting a driver task
    pub fn has_driver(self) -> bool {
        self.driver_task_name().is_some()
    }

    /// Whether finalization also waits for the Generator Complete Signal
    pub fn requires_generator_complete(self) -> bool {
        matches!(
            self,
            CampaignKind::ConnectorPruning | CampaignKind::ConnectorIndexing
        )
    }

    /// Whether a campaign with no work is still armed (count 0) and finalized
    pub fn arms_when_empty(self) -> bool {
        !matches!(self, CampaignKind::ConnectorSync)
    }

    /// Kinds whose live fence on the same resource prevents this kind from starting
    pub fn blocked_by(self) -> &'static [CampaignKind] {
        match self {
            CampaignKind::ConnectorDeletion => &[
                CampaignKind::ConnectorIndexing,
                CampaignKind::ConnectorPruning,
            ],
            CampaignKind::ConnectorPruning | CampaignKind::ConnectorIndexing => {
                &[CampaignKind::ConnectorDeletion]
            }
            _ => &[],
        }
    }

    /// Queue that individual work units go to
    pub fn work_queue(self) -> &'static str {
        match self {
            CampaignKind::ConnectorSync
            | CampaignKind::DocumentSetSync
            | CampaignKind::UserGroupSync => queues::DOCUMENT_SYNC,
            CampaignKind::ConnectorDeletion | CampaignKind::ConnectorPruning => {
                queues::CONNECTOR_DELETION
            }
            CampaignKind::ConnectorIndexing => queues::CONNECTOR_INDEXING,
        }
    }

    pub fn work_task_name(self) -> &'static str {
        match self {
            CampaignKind::ConnectorSync
            | CampaignKind::DocumentSetSync
            | CampaignKind::UserGroupSync => task_names::DOCUMENT_METADATA_SYNC,
            CampaignKind::ConnectorDeletion
            | CampaignKind::ConnectorPruning
            | CampaignKind::ConnectorIndexing => task_names::DOCUMENT_BY_CC_PAIR_CLEANUP,
        }
    }

    pub fn work_priority(self) -> TaskPriority {
        match self {
            CampaignKind::ConnectorPruning => TaskPriority::Low,
            _ => TaskPriority::Medium,
        }
    }

    pub fn driver_task_name(self) -> Option<&'static str> {
        match self {
            CampaignKind::ConnectorPruning => Some(task_names::CONNECTOR_PRUNING_GENERATOR),
            CampaignKind::ConnectorIndexing => Some(task_names::CONNECTOR_INDEXING_PROXY),
            _ => None,
        }
    }

    pub fn driver_queue(self) -> Option<&'static str> {
        match self {
            CampaignKind::ConnectorPruning => Some(queues::CONNECTOR_PRUNING),
            CampaignKind::ConnectorIndexing => Some(queues::CONNECTOR_INDEXING),
            _ => None,
        }
    }

    pub fn driver_priority(self) -> TaskPriority {
        match self {
            CampaignKind::ConnectorIndexing => TaskPriority::High,
            _ => TaskPriority::Low,
        }
    }
}

impl fmt::Display for CampaignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_prefix())
    }
}
