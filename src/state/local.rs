//! Local file-based state storage backend.
//!
//! State and lock are JSON files inside a `.stackwright/` directory. Saves
//! go through a temp file and an atomic rename so a crashed run never
//! leaves a torn state file behind.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, StackError, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo};
use super::store::StateStore;
use super::types::DeployedState;

/// Default state directory name.
const STATE_DIR: &str = ".stackwright";

/// State file name.
const STATE_FILE: &str = "state.json";

/// Lock file name.
const LOCK_FILE: &str = "state.lock";

/// Local file-based state store.
#[derive(Debug)]
pub struct LocalStateStore {
    /// Base directory for state files.
    base_dir: PathBuf,
    /// Path to the state file.
    state_path: PathBuf,
    /// Path to the lock file.
    lock_path: PathBuf,
}

impl LocalStateStore {
    /// Creates a new local state store rooted in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| StackError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a new local state store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let state_path = base_dir.join(STATE_FILE);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    /// Creates a new local state store from a custom state file path.
    #[must_use]
    pub fn with_state_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let base_dir = state_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let lock_path = base_dir.join(LOCK_FILE);

        Self {
            base_dir,
            state_path,
            lock_path,
        }
    }

    /// Ensures the state directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating state directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await.map_err(|e| {
                StateError::backend(format!("Failed to create state directory: {e}"))
            })?;
        }
        Ok(())
    }

    /// Reads and parses a JSON file, `None` if it does not exist.
    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            StateError::Corrupted {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;

        let value = serde_json::from_str(&content).map_err(|e| {
            StateError::Corrupted {
                message: format!("Failed to parse {}: {e}", path.display()),
            }
        })?;

        Ok(Some(value))
    }

    /// Serializes a value and writes it through a temp file plus atomic
    /// rename.
    async fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(value)
            .map_err(|e| StateError::serialization(format!("Failed to serialize: {e}")))?;

        let temp_path = path.with_extension("tmp");
        let io_err =
            |what: &str, e: std::io::Error| StateError::backend(format!("Failed to {what}: {e}"));

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| io_err("create temp file", e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| io_err("write file", e))?;
        file.sync_all().await.map_err(|e| io_err("sync file", e))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| io_err("rename file", e))?;

        Ok(())
    }

    /// Removes a file if present.
    async fn remove_if_present(path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).await.map_err(|e| {
                StateError::backend(format!("Failed to delete {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for LocalStateStore {
    async fn load(&self) -> Result<Option<DeployedState>> {
        let state = Self::read_json::<DeployedState>(&self.state_path).await?;
        match &state {
            Some(loaded) => info!(
                "Loaded state from {} (serial {})",
                self.state_path.display(),
                loaded.serial
            ),
            None => debug!("State file does not exist: {}", self.state_path.display()),
        }
        Ok(state)
    }

    async fn save(&self, state: &DeployedState) -> Result<()> {
        info!(
            "Saving state to {} (serial {})",
            self.state_path.display(),
            state.serial
        );
        self.write_json_atomic(&self.state_path, state).await
    }

    async fn delete(&self) -> Result<()> {
        info!("Deleting state file: {}", self.state_path.display());
        Self::remove_if_present(&self.state_path).await?;
        Self::remove_if_present(&self.lock_path).await
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.state_path.exists())
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        if let Some(existing) = Self::read_json::<LockInfo>(&self.lock_path).await? {
            if !existing.is_expired() {
                return Err(StackError::State(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock found, taking over");
        }

        let lock_info = LockInfo::for_holder(holder);
        self.write_json_atomic(&self.lock_path, &lock_info).await?;

        info!(
            "Acquired state lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        if let Some(existing) = Self::read_json::<LockInfo>(&self.lock_path).await? {
            if existing.lock_id == lock_id {
                Self::remove_if_present(&self.lock_path).await?;
                info!("Released state lock: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn get_lock_info(&self) -> Result<Option<LockInfo>> {
        Self::read_json(&self.lock_path).await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceKind;
    use crate::state::types::ResourceRecord;
    use tempfile::TempDir;

    fn create_test_store() -> (LocalStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = LocalStateStore::with_base_dir(temp_dir.path());
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let (store, _temp) = create_test_store();

        let mut state = DeployedState::new("soccer-backend", "prod");
        let seq = state.next_seq();
        state.set_record(ResourceRecord::new(
            "match-table",
            ResourceKind::Table,
            "abc123",
            seq,
        ));
        store.save(&state).await.expect("Failed to save state");

        let loaded = store
            .load()
            .await
            .expect("Failed to load state")
            .expect("State should exist");

        assert_eq!(loaded.project, "soccer-backend");
        assert_eq!(loaded.environment, "prod");
        assert_eq!(loaded.serial, state.serial);
        let record = loaded.get_record("match-table").expect("record exists");
        assert_eq!(record.kind, ResourceKind::Table);
        assert_eq!(record.seq, 1);
    }

    #[tokio::test]
    async fn test_load_nonexistent() {
        let (store, _temp) = create_test_store();

        let result = store.load().await.expect("Load should not fail");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_exists_follows_save_and_delete() {
        let (store, _temp) = create_test_store();
        assert!(!store.exists().await.expect("exists check failed"));

        let state = DeployedState::new("soccer-backend", "dev");
        store.save(&state).await.expect("Failed to save state");
        assert!(store.exists().await.expect("exists check failed"));

        store.delete().await.expect("Failed to delete state");
        assert!(!store.exists().await.expect("exists check failed"));
    }

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let (store, _temp) = create_test_store();

        let lock = store
            .acquire_lock("test-holder")
            .await
            .expect("Failed to acquire lock");

        assert!(store.is_locked().await.expect("is_locked failed"));

        store
            .release_lock(&lock.lock_id)
            .await
            .expect("Failed to release lock");

        assert!(!store.is_locked().await.expect("is_locked failed"));
    }

    #[tokio::test]
    async fn test_lock_conflict() {
        let (store, _temp) = create_test_store();

        let _lock1 = store
            .acquire_lock("holder-1")
            .await
            .expect("Failed to acquire first lock");

        let result = store.acquire_lock("holder-2").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_expired_lock_is_taken_over() {
        let (store, _temp) = create_test_store();

        let mut stale = LockInfo::new("crashed-run");
        stale.expires_at = chrono::Utc::now() - chrono::Duration::seconds(10);
        store
            .write_json_atomic(&store.lock_path, &stale)
            .await
            .expect("Failed to plant stale lock");

        let lock = store
            .acquire_lock("fresh-run")
            .await
            .expect("Takeover should succeed");
        assert_eq!(lock.holder, "fresh-run");
    }

    #[tokio::test]
    async fn test_release_with_wrong_id_keeps_lock() {
        let (store, _temp) = create_test_store();

        let _lock = store
            .acquire_lock("holder")
            .await
            .expect("Failed to acquire lock");

        store
            .release_lock("not-the-lock-id")
            .await
            .expect("Release should be a no-op");
        assert!(store.is_locked().await.expect("is_locked failed"));
    }
}
