//! External collaborators the campaigns and work units depend on

pub mod document_source;
pub mod in_memory;
pub mod relational;
pub mod vector_index;

pub use document_source::DocumentSource;
pub use in_memory::{InMemoryDocumentSource, InMemoryRelationalStore, InMemoryVectorIndex};
pub use relational::{
    CcPairId, DocumentSyncFields, IndexAttempt, IndexAttemptStatus, MembershipKind,
    RelationalStore,
};
pub use vector_index::VectorIndex;
