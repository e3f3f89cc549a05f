//! Fence values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrchestrationError, OrchestrationResult};

/// Structured fence value for deletion, pruning and indexing campaigns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPayload {
    /// Durable attempt record (indexing)
    pub index_attempt_id: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
    /// Driver task id, written by the driver itself once it starts executing
    pub executor_task_id: Option<String>,
    /// Final work-unit count; `None` until the generator has armed the fence
    pub expected: Option<u64>,
}

impl Default for CampaignPayload {
    fn default() -> Self {
        Self::new()
    }
}

impl CampaignPayload {
    pub fn new() -> Self {
        Self {
            index_attempt_id: None,
            started_at: None,
            submitted_at: Utc::now(),
            executor_task_id: None,
            expected: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.expected.is_some()
    }
}

/// Decoded content of a `{prefix}:fence:{id}` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FenceValue {
    Count(u64),
    Payload(CampaignPayload),
}

impl FenceValue {
    pub fn encode(&self) -> OrchestrationResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(key: &str, raw: &str) -> OrchestrationResult<Self> {
        serde_json::from_str(raw.trim())
            .map_err(|e| OrchestrationError::invalid_fence(key, e.to_string()))
    }

    pub fn expected(&self) -> Option<u64> {
        match self {
            FenceValue::Count(count) => Some(*count),
            FenceValue::Payload(payload) => payload.expected,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.expected().is_some()
    }

    pub fn payload(&self) -> Option<&CampaignPayload> {
        match self {
            FenceValue::Count(_) => None,
            FenceValue::Payload(payload) => Some(payload),
        }
    }
}
