//! Tenant-scoped view over a coordination store
//!
//! Every key is stored as `{tenant}:{key}`. Callers always deal in
//! un-prefixed keys; prefix scans strip the namespace before returning.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::CoordinationResult;
use super::traits::CoordinationStore;

#[derive(Debug, Clone)]
pub struct NamespacedStore {
    inner: Arc<dyn CoordinationStore>,
    namespace: String,
}

impl NamespacedStore {
    pub fn new(inner: Arc<dyn CoordinationStore>, tenant_id: impl Into<String>) -> Self {
        Self {
            inner,
            namespace: format!("{}:", tenant_id.into()),
        }
    }

    pub fn tenant_id(&self) -> &str {
        self.namespace.trim_end_matches(':')
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}

#[async_trait]
impl CoordinationStore for NamespacedStore {
    async fn get(&self, key: &str) -> CoordinationResult<Option<String>> {
        self.inner.get(&self.scoped(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CoordinationResult<()> {
        self.inner.set(&self.scoped(key), value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> CoordinationResult<bool> {
        self.inner.set_if_absent(&self.scoped(key), value, ttl).await
    }

    async fn exists(&self, key: &str) -> CoordinationResult<bool> {
        self.inner.exists(&self.scoped(key)).await
    }

    async fn delete(&self, keys: &[String]) -> CoordinationResult<u64> {
        let scoped: Vec<String> = keys.iter().map(|key| self.scoped(key)).collect();
        self.inner.delete(&scoped).await
    }

    async fn increment(&self, key: &str, by: i64) -> CoordinationResult<i64> {
        self.inner.increment(&self.scoped(key), by).await
    }

    async fn set_add(&self, key: &str, members: &[String]) -> CoordinationResult<u64> {
        self.inner.set_add(&self.scoped(key), members).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> CoordinationResult<bool> {
        self.inner.set_remove(&self.scoped(key), member).await
    }

    async fn set_cardinality(&self, key: &str) -> CoordinationResult<u64> {
        self.inner.set_cardinality(&self.scoped(key)).await
    }

    async fn set_members(&self, key: &str) -> CoordinationResult<Vec<String>> {
        self.inner.set_members(&self.scoped(key)).await
    }

    async fn scan_prefix(&self, prefix: &str) -> CoordinationResult<Vec<String>> {
        let keys = self.inner.scan_prefix(&self.scoped(prefix)).await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(&self.namespace).map(str::to_string))
            .collect())
    }

    async fn extend_if_value(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> CoordinationResult<bool> {
        self.inner
            .extend_if_value(&self.scoped(key), expected, ttl)
            .await
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> CoordinationResult<bool> {
        self.inner.delete_if_value(&self.scoped(key), expected).await
    }

    async fn health_check(&self) -> CoordinationResult<bool> {
        self.inner.health_check().await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;

    #[tokio::test]
    async fn test_tenants_do_not_collide() {
        let shared: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let tenant_a = NamespacedStore::new(shared.clone(), "tenant_a");
        let tenant_b = NamespacedStore::new(shared.clone(), "tenant_b");

        tenant_a.set("documentset:fence:1", "4", None).await.unwrap();
        assert_eq!(tenant_b.get("documentset:fence:1").await.unwrap(), None);
        assert_eq!(
            shared.get("tenant_a:documentset:fence:1").await.unwrap(),
            Some("4".to_string())
        );
    }

    #[tokio::test]
    async fn test_scan_strips_namespace() {
        let shared: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let tenant = NamespacedStore::new(shared.clone(), "acme");
        tenant.set("usergroup:fence:7", "0", None).await.unwrap();
        shared.set("usergroup:fence:8", "0", None).await.unwrap();

        let keys = tenant.scan_prefix("usergroup:fence:").await.unwrap();
        assert_eq!(keys, vec!["usergroup:fence:7"]);
        assert_eq!(tenant.tenant_id(), "acme");
    }
}
