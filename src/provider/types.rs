//! Provider payload types and the kind capability table.
//!
//! Resource kinds share one declaration shape; what varies per kind is the
//! API path and the operation set the provider supports. That variation
//! lives in a closed capability table instead of per-kind types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::graph::ResourceKind;

/// Provider-assigned identifiers and outputs for an applied resource.
pub type Outputs = BTreeMap<String, String>;

/// Attributes with every reference resolved to a concrete value.
pub type ResolvedAttrs = BTreeMap<String, serde_json::Value>;

/// Name of the output holding the provider's primary identifier.
pub const PRIMARY_ID_OUTPUT: &str = "id";

/// Per-kind provider capability.
#[derive(Debug, Clone, Copy)]
pub struct KindCapability {
    /// REST collection path for the kind.
    pub path: &'static str,
    /// Whether the provider supports in-place update for the kind.
    ///
    /// Kinds without it are replaced (delete then create) when they change.
    pub supports_update: bool,
}

/// Returns the capability entry for a resource kind.
#[must_use]
pub const fn capability(kind: ResourceKind) -> KindCapability {
    match kind {
        ResourceKind::Table => KindCapability {
            path: "tables",
            supports_update: true,
        },
        ResourceKind::Role => KindCapability {
            path: "roles",
            supports_update: true,
        },
        ResourceKind::Policy => KindCapability {
            path: "policies",
            supports_update: false,
        },
        ResourceKind::Function => KindCapability {
            path: "functions",
            supports_update: true,
        },
        ResourceKind::Rule => KindCapability {
            path: "rules",
            supports_update: true,
        },
        ResourceKind::Binding => KindCapability {
            path: "bindings",
            supports_update: false,
        },
    }
}

/// Request body for creating or updating a resource.
#[derive(Debug, Serialize)]
pub struct ResourceRequest<'a> {
    /// Resolved resource attributes.
    pub attributes: &'a ResolvedAttrs,
}

/// Response body for a successful create or update.
#[derive(Debug, Deserialize)]
pub struct ResourceResponse {
    /// Provider-assigned identifiers and outputs.
    #[serde(default)]
    pub outputs: Outputs,
}

/// Error payload returned by the provider API.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    /// Human-readable error message.
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_paths_are_distinct() {
        let kinds = [
            ResourceKind::Table,
            ResourceKind::Role,
            ResourceKind::Policy,
            ResourceKind::Function,
            ResourceKind::Rule,
            ResourceKind::Binding,
        ];

        let paths: std::collections::HashSet<&str> =
            kinds.iter().map(|&k| capability(k).path).collect();
        assert_eq!(paths.len(), kinds.len());
    }

    #[test]
    fn test_attachment_kinds_are_replaced_not_updated() {
        assert!(!capability(ResourceKind::Policy).supports_update);
        assert!(!capability(ResourceKind::Binding).supports_update);
        assert!(capability(ResourceKind::Table).supports_update);
    }
}
