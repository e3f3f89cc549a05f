//! Coordination store trait definition

use super::errors::CoordinationResult;
use async_trait::async_trait;
use std::time::Duration;

/// Key-value operations the orchestration layer relies on
///
/// Semantics follow Redis: string values with optional TTL, integer counters
/// stored as strings, sets of strings, and compare-and-swap helpers used by
/// the renewable beat lock. Every method is a single round-trip and atomic
/// with respect to the key it touches.
#[async_trait]
pub trait CoordinationStore: Send + Sync + std::fmt::Debug + 'static {
    /// Get a string value, `None` when absent or expired
    async fn get(&self, key: &str) -> CoordinationResult<Option<String>>;

    /// Set a string value, replacing anything stored at `key`
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoordinationResult<()>;

    /// Set only if the key does not exist; returns whether this call wrote it
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> CoordinationResult<bool>;

    async fn exists(&self, key: &str) -> CoordinationResult<bool>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> CoordinationResult<u64>;

    /// Atomically add `by` to an integer counter (created at 0)
    async fn increment(&self, key: &str, by: i64) -> CoordinationResult<i64>;

    /// Add members to a set, returning how many were newly inserted
    async fn set_add(&self, key: &str, members: &[String]) -> CoordinationResult<u64>;

    /// Remove one member from a set, returning whether it was present
    async fn set_remove(&self, key: &str, member: &str) -> CoordinationResult<bool>;

    async fn set_cardinality(&self, key: &str) -> CoordinationResult<u64>;

    async fn set_members(&self, key: &str) -> CoordinationResult<Vec<String>>;

    /// All live keys starting with `prefix` (non-blocking iteration on distributed backends)
    async fn scan_prefix(&self, prefix: &str) -> CoordinationResult<Vec<String>>;

    /// Reset the TTL of `key` only while it still holds `expected`
    async fn extend_if_value(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> CoordinationResult<bool>;

    /// Delete `key` only while it still holds `expected`
    async fn delete_if_value(&self, key: &str, expected: &str) -> CoordinationResult<bool>;

    async fn health_check(&self) -> CoordinationResult<bool>;

    fn provider_name(&self) -> &'static str;
}
