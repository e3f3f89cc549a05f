//! Key naming for per-resource campaign state
//!
//! `{prefix}:fence:{id}`, `{prefix}:taskset:{id}`,
//! `{prefix}:generator_progress:{id}`, `{prefix}:generator_complete:{id}`,
//! `{prefix}:active:{id}`, `{prefix}:generating:{id}` and
//! `{prefix}:terminate:{driver_task_id}`.

use super::{CampaignKind, ResourceId};
use crate::constants::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CampaignKeys {
    pub kind: CampaignKind,
    pub resource_id: ResourceId,
}

impl CampaignKeys {
    pub fn new(kind: CampaignKind, resource_id: ResourceId) -> Self {
        Self { kind, resource_id }
    }

    fn scoped(&self, fragment: &str) -> String {
        format!("{}:{}:{}", self.kind.key_prefix(), fragment, self.resource_id)
    }

    pub fn fence(&self) -> String {
        self.scoped(keys::FENCE)
    }

    pub fn taskset(&self) -> String {
        self.scoped(keys::TASKSET)
    }

    pub fn generator_progress(&self) -> String {
        self.scoped(keys::GENERATOR_PROGRESS)
    }

    pub fn generator_complete(&self) -> String {
        self.scoped(keys::GENERATOR_COMPLETE)
    }

    pub fn active(&self) -> String {
        self.scoped(keys::ACTIVE)
    }

    /// Held by the single generator of a count-fence campaign until it arms
    pub fn generating(&self) -> String {
        self.scoped(keys::GENERATING)
    }

    /// Per-resource keys other than the fence
    pub fn auxiliary(&self) -> Vec<String> {
        vec![
            self.taskset(),
            self.generator_progress(),
            self.generator_complete(),
            self.active(),
            self.generating(),
        ]
    }

    /// Every key `release` removes, fence last
    pub fn all(&self) -> Vec<String> {
        let mut keys = self.auxiliary();
        keys.push(self.fence());
        keys
    }

    pub fn terminate(kind: CampaignKind, driver_task_id: &str) -> String {
        format!("{}:{}:{}", kind.key_prefix(), keys::TERMINATE, driver_task_id)
    }

    pub fn fence_prefix(kind: CampaignKind) -> String {
        format!("{}:{}:", kind.key_prefix(), keys::FENCE)
    }

    /// Resource id of a fence key belonging to `kind`
    pub fn parse_fence_key(kind: CampaignKind, key: &str) -> Option<ResourceId> {
        key.strip_prefix(&Self::fence_prefix(kind))?.parse().ok()
    }
}
