//! State types for tracking applied resources.
//!
//! These types record what has actually been provisioned, keyed by resource
//! id. The state is a versioned snapshot passed by value into the planner
//! and executor; the executor is its only mutator during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::graph::ResourceKind;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// Maximum number of retained history entries.
const MAX_HISTORY: usize = 100;

/// The complete record of provisioned resources for a stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedState {
    /// State format version.
    pub version: String,
    /// Monotonically increasing snapshot serial, bumped on every mutation.
    pub serial: u64,
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// Fingerprint of the last fully applied declaration set.
    pub config_hash: String,
    /// Applied resources by id.
    pub resources: HashMap<String, ResourceRecord>,
    /// Source for apply sequence numbers.
    pub last_seq: u64,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Apply history (recent entries).
    #[serde(default)]
    pub history: Vec<ApplyHistoryEntry>,
}

/// The applied record of a single resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Resource id (from the declaration).
    pub id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Fingerprint of the declared attributes at apply time.
    pub fingerprint: String,
    /// Resolved attribute snapshot sent to the provider.
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// Provider-assigned identifiers and outputs.
    pub outputs: BTreeMap<String, String>,
    /// Apply sequence number; later numbers were applied after earlier ones.
    pub seq: u64,
    /// When the resource was first created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// A single entry in the apply history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyHistoryEntry {
    /// When the run occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of operation.
    pub operation: ApplyOperation,
    /// Declaration fingerprint at the time of the run.
    pub config_hash: String,
    /// Resources affected.
    pub resources: Vec<String>,
    /// Whether the run succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of state-mutating operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOperation {
    /// Plan application.
    Apply,
    /// Full teardown.
    Destroy,
}

impl DeployedState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new(project: &str, environment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            serial: 0,
            project: project.to_string(),
            environment: environment.to_string(),
            config_hash: String::new(),
            resources: HashMap::new(),
            last_seq: 0,
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a record by resource id.
    #[must_use]
    pub fn get_record(&self, id: &str) -> Option<&ResourceRecord> {
        self.resources.get(id)
    }

    /// Gets a mutable reference to a record by resource id.
    pub fn get_record_mut(&mut self, id: &str) -> Option<&mut ResourceRecord> {
        self.resources.get_mut(id)
    }

    /// Adds or replaces a record.
    pub fn set_record(&mut self, record: ResourceRecord) {
        self.resources.insert(record.id.clone(), record);
        self.touch();
    }

    /// Removes a record by resource id.
    pub fn remove_record(&mut self, id: &str) -> Option<ResourceRecord> {
        let result = self.resources.remove(id);
        if result.is_some() {
            self.touch();
        }
        result
    }

    /// Allocates the next apply sequence number.
    pub fn next_seq(&mut self) -> u64 {
        self.last_seq += 1;
        self.last_seq
    }

    /// Returns all recorded resource ids.
    #[must_use]
    pub fn record_ids(&self) -> Vec<&str> {
        self.resources.keys().map(String::as_str).collect()
    }

    /// Returns records sorted by descending apply sequence (most recently
    /// applied first). Dependents were applied after their dependencies, so
    /// this is a safe delete order for resources no longer declared.
    #[must_use]
    pub fn records_newest_first(&self) -> Vec<&ResourceRecord> {
        let mut records: Vec<&ResourceRecord> = self.resources.values().collect();
        records.sort_by(|a, b| b.seq.cmp(&a.seq).then_with(|| a.id.cmp(&b.id)));
        records
    }

    /// Adds a history entry, evicting the oldest past the retention cap.
    pub fn add_history(&mut self, entry: ApplyHistoryEntry) {
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
        self.touch();
    }

    /// Returns true when no resources are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Bumps the snapshot serial and update timestamp.
    fn touch(&mut self) {
        self.serial += 1;
        self.last_updated = Utc::now();
    }
}

impl ResourceRecord {
    /// Creates a new record for a freshly applied resource.
    #[must_use]
    pub fn new(id: &str, kind: ResourceKind, fingerprint: &str, seq: u64) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            kind,
            fingerprint: fingerprint.to_string(),
            attributes: BTreeMap::new(),
            outputs: BTreeMap::new(),
            seq,
            created_at: now,
            updated_at: now,
        }
    }

    /// Looks up a provider output by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }

    /// Replaces the provider outputs.
    pub fn set_outputs(&mut self, outputs: BTreeMap<String, String>) {
        self.outputs = outputs;
        self.updated_at = Utc::now();
    }
}

impl ApplyHistoryEntry {
    /// Creates a new successful history entry.
    #[must_use]
    pub fn new(operation: ApplyOperation, config_hash: &str, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(
        operation: ApplyOperation,
        config_hash: &str,
        resources: Vec<String>,
        error: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for ApplyOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_remove_record_bump_serial() {
        let mut state = DeployedState::new("backend", "dev");
        assert_eq!(state.serial, 0);

        let seq = state.next_seq();
        state.set_record(ResourceRecord::new("match-table", ResourceKind::Table, "abc", seq));
        assert_eq!(state.serial, 1);
        assert!(state.get_record("match-table").is_some());

        state.remove_record("match-table");
        assert_eq!(state.serial, 2);
        assert!(state.is_empty());
    }

    #[test]
    fn test_records_newest_first_orders_by_seq() {
        let mut state = DeployedState::new("backend", "dev");
        for id in ["match-table", "lambda-role", "recorder-fn"] {
            let seq = state.next_seq();
            state.set_record(ResourceRecord::new(id, ResourceKind::Table, "x", seq));
        }

        let ids: Vec<&str> = state
            .records_newest_first()
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["recorder-fn", "lambda-role", "match-table"]);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = DeployedState::new("backend", "dev");
        for i in 0..150 {
            state.add_history(ApplyHistoryEntry::new(
                ApplyOperation::Apply,
                &format!("hash-{i}"),
                vec![],
            ));
        }
        assert_eq!(state.history.len(), 100);
        assert_eq!(state.history.last().map(|h| h.config_hash.as_str()), Some("hash-149"));
    }
}
