//! # Campaigns
//!
//! A campaign is one fenced fan-out operation on one resource. This module
//! holds the key naming, the fence value formats, the per-resource store
//! primitives and the [`Campaign`] trait every kind implements.

pub mod fence;
pub mod keys;
pub mod kind;
pub mod kinds;
pub mod payload;
pub mod traits;

pub use fence::CampaignFence;
pub use keys::CampaignKeys;
pub use kind::{CampaignKind, FenceStyle};
pub use payload::{CampaignPayload, FenceValue};
pub use traits::{
    Campaign, CampaignRef, DrainedCampaign, FinalizeOutcome, ResourceId, WorkItem,
};
