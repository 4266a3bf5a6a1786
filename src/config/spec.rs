//! Declaration specification types for the provisioning system.
//!
//! This module defines the structs that map to the `stackwright.stack.yaml`
//! file. These types are designed to be declarative and fully describe the
//! desired state of a stack.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::graph::{AttrValue, Graph, GraphBuilder, ResourceKind};

/// The root declaration structure for a Stackwright stack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// State backend configuration.
    pub state: StateConfig,
    /// Provider endpoint configuration.
    pub provider: ProviderConfig,
    /// Optional execution settings.
    #[serde(default)]
    pub settings: SettingsConfig,
    /// Declared resources.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Unique name for the project.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// State backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Backend type (local or s3).
    pub backend: StateBackend,
    /// S3 bucket name (required for s3 backend).
    #[serde(default)]
    pub bucket: Option<String>,
    /// S3 key prefix (optional).
    #[serde(default)]
    pub prefix: Option<String>,
    /// S3 region (optional, uses AWS default if not specified).
    #[serde(default)]
    pub region: Option<String>,
    /// Local state directory path (for local backend).
    #[serde(default)]
    pub path: Option<String>,
}

/// State backend types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateBackend {
    /// Local file-based state storage.
    #[default]
    Local,
    /// AWS S3-based state storage.
    S3,
}

/// Provider endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Base URL of the provisioning API.
    pub endpoint: String,
    /// Request timeout in seconds.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

/// Execution settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsConfig {
    /// Whether `destroy` requires an interactive confirmation.
    #[serde(default = "default_destroy_confirmation")]
    pub destroy_confirmation: bool,
    /// Maximum attempts per provider call on transient errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries, in milliseconds.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Optional overall deadline for an apply run, in seconds.
    ///
    /// Checked only at action boundaries; an in-flight provider call always
    /// runs to completion.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

/// Declaration of a single resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    /// Unique id for the resource within this stack.
    pub id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Explicit dependencies on other resource ids.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Resource attributes; `${id.attribute}` strings are promoted into
    /// typed references during graph construction.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_yaml::Value>,
}

// Default value functions

const fn default_destroy_confirmation() -> bool {
    true
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_base_ms() -> u64 {
    500
}

const fn default_provider_timeout() -> u64 {
    30
}

fn default_environment() -> String {
    String::from("dev")
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            destroy_confirmation: default_destroy_confirmation(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            deadline_secs: None,
        }
    }
}

impl StackConfig {
    /// Returns the fully qualified project name including environment.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Returns declared resource ids in declaration order.
    #[must_use]
    pub fn resource_ids(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.id.as_str()).collect()
    }

    /// Assembles the declared resources into a validated dependency graph.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed reference expressions, duplicate ids,
    /// dangling references, or dependency cycles.
    pub fn build_graph(&self) -> Result<Graph> {
        let mut builder = GraphBuilder::new();

        for resource in &self.resources {
            let mut attributes = BTreeMap::new();
            for (key, value) in &resource.attributes {
                attributes.insert(key.clone(), AttrValue::from_yaml(value)?);
            }
            builder.declare(
                resource.kind,
                resource.id.clone(),
                attributes,
                resource.depends_on.clone(),
            )?;
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = SettingsConfig::default();
        assert!(settings.destroy_confirmation);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_base_ms, 500);
        assert!(settings.deadline_secs.is_none());
    }

    #[test]
    fn test_build_graph_from_declarations() {
        let yaml = r"
project:
  name: backend
state:
  backend: local
provider:
  endpoint: https://provisioner.example/api
resources:
  - id: match-table
    kind: table
    attributes:
      name: favorite-team-matches
      partition_key: uniqueId
  - id: lambda-role
    kind: role
    depends_on: [match-table]
    attributes:
      service: lambda.amazonaws.com
";
        let config: StackConfig = serde_yaml::from_str(yaml).expect("yaml should parse");
        let graph = config.build_graph().expect("graph should build");

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.dependency_ids("lambda-role"), vec!["match-table"]);
    }
}
