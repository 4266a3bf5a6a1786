//! State store trait definition.
//!
//! This module defines the common interface for state storage backends.
//! Backends provide load/save/delete plus an advisory lock; liveness
//! queries are derived from the lock itself.

use async_trait::async_trait;

use super::lock::LockInfo;
use super::types::DeployedState;
use crate::error::Result;

/// Trait for state storage backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Loads the deployed state.
    ///
    /// Returns `None` if no state exists yet.
    async fn load(&self) -> Result<Option<DeployedState>>;

    /// Saves the deployed state.
    async fn save(&self, state: &DeployedState) -> Result<()>;

    /// Deletes the deployed state and any lock.
    async fn delete(&self) -> Result<()>;

    /// Checks if state exists.
    async fn exists(&self) -> Result<bool>;

    /// Acquires a lock on the state.
    ///
    /// An empty `holder` means "identify the current process".
    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo>;

    /// Releases a lock on the state.
    ///
    /// Releasing a lock that is not held (or held under another id) is a
    /// no-op.
    async fn release_lock(&self, lock_id: &str) -> Result<()>;

    /// Gets current lock information if a lock is present.
    async fn get_lock_info(&self) -> Result<Option<LockInfo>>;

    /// Checks if the state is currently locked (present and not expired).
    async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .get_lock_info()
            .await?
            .is_some_and(|lock| !lock.is_expired()))
    }

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}

#[async_trait]
impl StateStore for Box<dyn StateStore> {
    async fn load(&self) -> Result<Option<DeployedState>> {
        (**self).load().await
    }

    async fn save(&self, state: &DeployedState) -> Result<()> {
        (**self).save(state).await
    }

    async fn delete(&self) -> Result<()> {
        (**self).delete().await
    }

    async fn exists(&self) -> Result<bool> {
        (**self).exists().await
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        (**self).acquire_lock(holder).await
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        (**self).release_lock(lock_id).await
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        (**self).get_lock_info().await
    }

    async fn is_locked(&self) -> Result<bool> {
        (**self).is_locked().await
    }

    fn backend_type(&self) -> &'static str {
        (**self).backend_type()
    }
}
