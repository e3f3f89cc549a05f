//! # Orchestration
//!
//! The campaign lifecycle, split by role:
//!
//! - [`Generator`]: fan-out, fence arming and the pruning driver body
//! - [`CampaignScheduler`]: periodic "start campaigns for due resources" pass
//! - [`Monitor`]: beat that finalizes drained campaigns
//! - [`Watchdog`]: reconciliation of fences whose owner died
//! - [`OrchestrationService`]: the background loops around the three passes
//!
//! Every role reaches shared state only through the coordination store, so
//! any number of processes may run them side by side.

pub mod generator;
pub mod monitor;
pub mod registry;
pub mod scheduler;
pub mod service;
pub mod watchdog;

pub use generator::{DriverArgs, Generator};
pub use monitor::{BeatReport, CampaignCheck, Monitor};
pub use registry::CampaignRegistry;
pub use scheduler::{CampaignScheduler, SchedulingReport};
pub use service::OrchestrationService;
pub use watchdog::{FenceVerdict, Watchdog, WatchdogReport, WatchdogSkip};
