//! Worker-side execution of campaign work units and driver tasks

pub mod dispatcher;
pub mod handlers;

pub use dispatcher::{TaskOutcome, WorkUnit, WorkUnitDispatcher, WorkUnitHandler};
pub use handlers::{
    DocumentCleanupHandler, DocumentMetadataSyncHandler, IndexingProxyHandler,
    PruningGeneratorHandler,
};
