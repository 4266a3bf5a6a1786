//! S3-based state storage backend.
//!
//! Remote state on AWS S3 (or compatible services) for stacks shared
//! between operators and CI. State and lock live under a common key
//! prefix; lock takeover honors the same expiry rules as the local
//! backend.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{Result, StackError, StateError};

use super::lock::{LOCK_EXPIRY_SECS, LockInfo};
use super::store::StateStore;
use super::types::DeployedState;

/// State file key suffix.
const STATE_KEY: &str = "state.json";

/// Lock file key suffix.
const LOCK_KEY: &str = "state.lock";

/// S3-based state store.
#[derive(Debug)]
pub struct S3StateStore {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix, empty or ending in `/`.
    prefix: String,
}

impl S3StateStore {
    /// Creates a new S3 state store.
    ///
    /// # Errors
    ///
    /// Returns an error if the S3 client cannot be initialized.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Result<Self> {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };

        Ok(Self::with_client(Client::new(&config), bucket, prefix))
    }

    /// Creates a new S3 state store with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map_or_else(String::new, |p| format!("{p}/"));

        Self {
            client,
            bucket: bucket.to_string(),
            prefix,
        }
    }

    /// Gets the full S3 key for a file.
    fn key(&self, file: &str) -> String {
        format!("{}{file}", self.prefix)
    }

    /// Fetches and parses a JSON object, `None` if the key is absent.
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_no_such_key() {
                    return Ok(None);
                }
                return Err(StackError::State(StateError::backend(format!(
                    "S3 get error: {service_err}"
                ))));
            }
        };

        let bytes = response.body.collect().await.map_err(|e| {
            StateError::backend(format!("Failed to read S3 object: {e}"))
        })?;

        let value = serde_json::from_slice(&bytes.to_vec()).map_err(|e| {
            StateError::Corrupted {
                message: format!("Failed to parse s3://{}/{key}: {e}", self.bucket),
            }
        })?;

        Ok(Some(value))
    }

    /// Serializes a value and puts it under the given key.
    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| StateError::serialization(format!("Failed to serialize: {e}")))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(content.into_bytes().into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| StateError::backend(format!("S3 put error: {e}")))?;

        Ok(())
    }

    /// Deletes an object.
    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StateError::backend(format!("S3 delete error: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for S3StateStore {
    async fn load(&self) -> Result<Option<DeployedState>> {
        let key = self.key(STATE_KEY);
        debug!("Loading state from s3://{}/{key}", self.bucket);

        let state = self.get_json::<DeployedState>(&key).await?;
        match &state {
            Some(loaded) => info!(
                "Loaded state for {}/{} (serial {})",
                loaded.project, loaded.environment, loaded.serial
            ),
            None => debug!("No state found in S3"),
        }
        Ok(state)
    }

    async fn save(&self, state: &DeployedState) -> Result<()> {
        let key = self.key(STATE_KEY);
        info!(
            "Saving state to s3://{}/{key} (serial {})",
            self.bucket, state.serial
        );
        self.put_json(&key, state).await
    }

    async fn delete(&self) -> Result<()> {
        let state_key = self.key(STATE_KEY);
        info!("Deleting state from s3://{}/{state_key}", self.bucket);

        self.delete_object(&state_key).await?;
        self.delete_object(&self.key(LOCK_KEY)).await
    }

    async fn exists(&self) -> Result<bool> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.key(STATE_KEY))
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                let service_err = sdk_err.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(StackError::State(StateError::backend(format!(
                        "S3 head error: {service_err}"
                    ))))
                }
            }
        }
    }

    async fn acquire_lock(&self, holder: &str) -> Result<LockInfo> {
        let key = self.key(LOCK_KEY);

        if let Some(existing) = self.get_json::<LockInfo>(&key).await? {
            if !existing.is_expired() {
                return Err(StackError::State(StateError::LockedByOther {
                    holder: existing.holder,
                    since: existing.acquired_at.to_rfc3339(),
                }));
            }
            debug!("Expired lock found, taking over");
        }

        let lock_info = LockInfo::for_holder(holder);
        self.put_json(&key, &lock_info).await?;

        info!(
            "Acquired state lock: {} (expires in {}s)",
            lock_info.lock_id, LOCK_EXPIRY_SECS
        );

        Ok(lock_info)
    }

    async fn release_lock(&self, lock_id: &str) -> Result<()> {
        let key = self.key(LOCK_KEY);

        if let Some(existing) = self.get_json::<LockInfo>(&key).await? {
            if existing.lock_id == lock_id {
                self.delete_object(&key).await?;
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
        self.get_json(&self.key(LOCK_KEY)).await
    }

    fn backend_type(&self) -> &'static str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_prefix(prefix: Option<&str>) -> S3StateStore {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .build();
        S3StateStore::with_client(Client::from_conf(config), "state-bucket", prefix)
    }

    #[test]
    fn test_prefix_normalization() {
        assert_eq!(store_with_prefix(None).key(STATE_KEY), "state.json");
        assert_eq!(store_with_prefix(Some("")).key(STATE_KEY), "state.json");
        assert_eq!(
            store_with_prefix(Some("/stacks/prod/")).key(STATE_KEY),
            "stacks/prod/state.json"
        );
        assert_eq!(
            store_with_prefix(Some("stacks/prod")).key(LOCK_KEY),
            "stacks/prod/state.lock"
        );
    }

    #[test]
    fn test_backend_type() {
        assert_eq!(store_with_prefix(None).backend_type(), "s3");
    }
}
