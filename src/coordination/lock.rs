//! # Beat Lock
//!
//! Renewable, token-owned mutual-exclusion lock held in the coordination
//! store under `beat_lock:{name}`. Acquisition never blocks: a held lock means
//! another beat is running and the caller skips its pass.
//!
//! The lease must be renewed with [`BeatLock::reacquire`] between units of
//! work. Renewal only succeeds while the stored token is still ours, so a
//! holder whose lease expired learns about it before touching shared state.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use super::traits::CoordinationStore;
use crate::constants::keys;
use crate::error::{OrchestrationError, OrchestrationResult};

#[derive(Debug)]
pub struct BeatLock {
    store: Arc<dyn CoordinationStore>,
    key: String,
    token: String,
    timeout: Duration,
}

impl BeatLock {
    pub fn key_for(name: &str) -> String {
        format!("{}:{}", keys::BEAT_LOCK, name)
    }

    /// Try to take the lock; `Ok(None)` when someone else holds it
    pub async fn try_acquire(
        store: Arc<dyn CoordinationStore>,
        name: &str,
        timeout: Duration,
    ) -> OrchestrationResult<Option<Self>> {
        let key = Self::key_for(name);
        let token = Uuid::new_v4().to_string();

        if !store.set_if_absent(&key, &token, Some(timeout)).await? {
            debug!(lock = %key, "Beat lock held elsewhere");
            return Ok(None);
        }

        debug!(lock = %key, timeout_ms = timeout.as_millis() as u64, "Beat lock acquired");
        Ok(Some(Self {
            store,
            key,
            token,
            timeout,
        }))
    }

    /// Extend the lease; `LockLost` once the key no longer carries our token
    pub async fn reacquire(&self) -> OrchestrationResult<()> {
        if self
            .store
            .extend_if_value(&self.key, &self.token, self.timeout)
            .await?
        {
            Ok(())
        } else {
            warn!(lock = %self.key, "Beat lock lost before the beat finished");
            Err(OrchestrationError::lock_lost(&self.key))
        }
    }

    /// Whether this holder still owns the lock
    pub async fn owned(&self) -> OrchestrationResult<bool> {
        Ok(self.store.get(&self.key).await?.as_deref() == Some(self.token.as_str()))
    }

    /// Release the lock if still owned; releasing a lost lock is a no-op
    pub async fn release(self) -> OrchestrationResult<bool> {
        let released = self.store.delete_if_value(&self.key, &self.token).await?;
        debug!(lock = %self.key, released = released, "Beat lock released");
        Ok(released)
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
