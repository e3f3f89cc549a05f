#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, OpenTelemetry in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # DocSync Orchestrator
//!
//! Fenced background-job orchestration for a document search backend.
//!
//! ## Overview
//!
//! A logical operation on one resource (re-sync a connector's stale
//! documents, propagate a document-set or user-group change, delete a
//! connector, prune documents that vanished from the source, run an indexing
//! pass) is a **campaign**. A generator fans the campaign out into many small
//! executor tasks, records every task id in a task set, and only then arms a
//! fence. Workers remove their id when they finish; a periodic monitor beat
//! finalizes every campaign whose task set drained. A watchdog resets fences
//! whose driver task died.
//!
//! All coordination goes through a shared key-value store, so any number of
//! schedulers, monitors and workers may run side by side.
//!
//! ## Module Organization
//!
//! - [`coordination`] - Store trait, in-memory and Redis providers, beat locks
//! - [`executor`] - Task executor seam and the in-memory executor
//! - [`campaign`] - Key naming, fence values, fence primitives, campaign kinds
//! - [`orchestration`] - Generator, scheduler, monitor, watchdog, service loops
//! - [`worker`] - Work unit dispatch and the built-in handlers
//! - [`indexing`] - Supervised indexing runs
//! - [`collaborators`] - Relational store, document source and vector index seams
//! - [`config`] - Configuration loading and validation
//! - [`logging`] / [`metrics`] - Structured logging and OpenTelemetry counters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docsync_orchestrator::collaborators::{InMemoryDocumentSource, InMemoryRelationalStore};
//! use docsync_orchestrator::config::ConfigLoader;
//! use docsync_orchestrator::executor::InMemoryTaskExecutor;
//! use docsync_orchestrator::orchestration::{CampaignRegistry, OrchestrationService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new("config/orchestration.toml").load()?;
//! let store = docsync_orchestrator::coordination::connect(&config.coordination).await?;
//! let registry = Arc::new(CampaignRegistry::with_default_campaigns(
//!     Arc::new(InMemoryRelationalStore::new()),
//!     Arc::new(InMemoryDocumentSource::new()),
//! ));
//!
//! let service = OrchestrationService::new(
//!     &config,
//!     store,
//!     Arc::new(InMemoryTaskExecutor::new()),
//!     registry,
//! );
//! let handles = service.start();
//! // ...
//! service.shutdown();
//! for handle in handles {
//!     handle.await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod campaign;
pub mod collaborators;
pub mod config;
pub mod constants;
pub mod coordination;
pub mod error;
pub mod executor;
pub mod indexing;
pub mod logging;
pub mod metrics;
pub mod orchestration;
pub mod worker;

pub use campaign::{
    Campaign, CampaignFence, CampaignKind, CampaignPayload, DrainedCampaign, FenceValue,
    FinalizeOutcome, ResourceId, WorkItem,
};
pub use config::{ConfigLoader, ConfigurationError, OrchestrationConfig};
pub use coordination::{BeatLock, CoordinationError, CoordinationStore, InMemoryCoordinationStore};
pub use error::{OrchestrationError, OrchestrationResult};
pub use executor::{InMemoryTaskExecutor, TaskExecutor, TaskSubmission};
pub use indexing::{IndexingRunOutcome, IndexingSupervisor};
pub use logging::init_structured_logging;
pub use orchestration::{
    CampaignRegistry, CampaignScheduler, Generator, Monitor, OrchestrationService, Watchdog,
};
pub use worker::{TaskOutcome, WorkUnitDispatcher, WorkUnitHandler};
