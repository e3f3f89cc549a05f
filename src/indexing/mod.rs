//! Supervised indexing runs: the driver-side supervisor, the process
//! spawning seam and the child-side heartbeat.

pub mod heartbeat;
pub mod spawner;
pub mod supervisor;

pub use heartbeat::IndexingHeartbeat;
pub use spawner::{JobExit, JobRequest, JobSpawner, ProcessSpawner, SpawnedJob};
pub use supervisor::{IndexingRunOutcome, IndexingSupervisor};
