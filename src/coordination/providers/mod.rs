//! Coordination store provider implementations

pub mod in_memory;

#[cfg(feature = "coordination-redis")]
pub mod redis;

pub use in_memory::InMemoryCoordinationStore;

#[cfg(feature = "coordination-redis")]
pub use self::redis::RedisCoordinationStore;
