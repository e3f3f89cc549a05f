//! # Coordination Store
//!
//! Shared key-value state every participant uses to agree on campaign
//! progress: fences, task sets, progress counters, liveness keys and beat
//! locks.
//!
//! ```text
//! Arc<dyn CoordinationStore>
//!   ├── InMemoryCoordinationStore   <- dashmap, single process, tests
//!   ├── RedisCoordinationStore      <- ConnectionManager (feature: coordination-redis)
//!   └── NamespacedStore             <- `{tenant}:` prefix over either of the above
//! ```

pub mod errors;
pub mod lock;
pub mod namespaced;
pub mod providers;
pub mod traits;

use std::sync::Arc;

use tracing::info;

pub use errors::{CoordinationError, CoordinationResult};
pub use lock::BeatLock;
pub use namespaced::NamespacedStore;
pub use providers::InMemoryCoordinationStore;
pub use traits::CoordinationStore;

#[cfg(feature = "coordination-redis")]
pub use providers::RedisCoordinationStore;

use crate::config::{CoordinationBackend, CoordinationConfig};
use crate::error::OrchestrationResult;

/// Build the configured store, scoped to the tenant when one is configured
pub async fn connect(config: &CoordinationConfig) -> OrchestrationResult<Arc<dyn CoordinationStore>> {
    let store: Arc<dyn CoordinationStore> = match config.backend {
        CoordinationBackend::Memory => Arc::new(InMemoryCoordinationStore::new()),
        #[cfg(feature = "coordination-redis")]
        CoordinationBackend::Redis => {
            Arc::new(RedisCoordinationStore::from_config(&config.redis).await?)
        }
        #[cfg(not(feature = "coordination-redis"))]
        CoordinationBackend::Redis => {
            return Err(crate::config::ConfigurationError::UnsupportedBackend(
                "redis backend requires the coordination-redis feature".to_string(),
            )
            .into());
        }
    };

    info!(
        provider = store.provider_name(),
        tenant = config.tenant_id.as_deref().unwrap_or("-"),
        "Coordination store ready"
    );

    Ok(match &config.tenant_id {
        Some(tenant) if !tenant.is_empty() => Arc::new(NamespacedStore::new(store, tenant.clone())),
        _ => store,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory_with_tenant() {
        let config = CoordinationConfig {
            tenant_id: Some("acme".to_string()),
            ..CoordinationConfig::default()
        };
        let store = connect(&config).await.unwrap();
        assert_eq!(store.provider_name(), "memory");
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }
}
