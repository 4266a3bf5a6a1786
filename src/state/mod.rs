//! State management module for the Stackwright provisioning system.
//!
//! This module provides persistent storage for the record of provisioned
//! resources: attribute snapshots, provider-assigned identifiers, apply
//! sequence numbers, and run history.

mod store;
mod local;
mod s3;
mod lock;
mod types;

pub use store::StateStore;
pub use local::LocalStateStore;
pub use s3::S3StateStore;
pub use lock::{LOCK_EXPIRY_SECS, LockInfo};
pub use types::{
    ApplyHistoryEntry, ApplyOperation, DeployedState, ResourceRecord, STATE_VERSION,
};
