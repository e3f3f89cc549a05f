//! # System Constants
//!
//! Queue names, task names, key fragments and signal codes shared by the
//! generators, monitor, watchdog and work-unit handlers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Executor queues that campaign work is routed to
pub mod queues {
    pub const DOCUMENT_SYNC: &str = "vespa_metadata_sync";
    pub const CONNECTOR_DELETION: &str = "connector_deletion";
    pub const CONNECTOR_PRUNING: &str = "connector_pruning";
    pub const CONNECTOR_INDEXING: &str = "connector_indexing";
}

/// Names of the executor tasks emitted by generators and the scheduler
pub mod task_names {
    /// Per-document metadata sync (connector, document set and user group campaigns)
    pub const DOCUMENT_METADATA_SYNC: &str = "document_metadata_sync_task";
    /// Per-document cleanup for a connector/credential pair (deletion and pruning)
    pub const DOCUMENT_BY_CC_PAIR_CLEANUP: &str = "document_by_cc_pair_cleanup_task";
    /// Driver task that crawls the source and emits cleanup tasks
    pub const CONNECTOR_PRUNING_GENERATOR: &str = "connector_pruning_generator_task";
    /// Driver task that supervises the spawned indexing process
    pub const CONNECTOR_INDEXING_PROXY: &str = "connector_indexing_proxy_task";
}

/// Coordination-store key fragments
pub mod keys {
    pub const FENCE: &str = "fence";
    pub const TASKSET: &str = "taskset";
    pub const GENERATOR_PROGRESS: &str = "generator_progress";
    pub const GENERATOR_COMPLETE: &str = "generator_complete";
    pub const ACTIVE: &str = "active";
    pub const GENERATING: &str = "generating";
    pub const TERMINATE: &str = "terminate";
    pub const BEAT_LOCK: &str = "beat_lock";
    pub const SIGNAL: &str = "signal";
}

/// Codes written to the generator-complete key
pub mod completion {
    pub const OK: i64 = 200;
    pub const FAILED: i64 = 500;

    pub fn is_ok(code: i64) -> bool {
        code == OK
    }
}

/// Beat lock names (prefixed with `beat_lock:` in the store)
pub mod locks {
    pub const MONITOR_BEAT: &str = "monitor_campaigns_beat";
    pub const WATCHDOG_BEAT: &str = "validate_fences_beat";
}

/// Executor priority levels; lower discriminants are served first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Highest = 0,
    High = 1,
    Medium = 2,
    Low = 3,
    Lowest = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskPriority::Highest => write!(f, "highest"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::Low => write!(f, "low"),
            TaskPriority::Lowest => write!(f, "lowest"),
        }
    }
}
