//! Plan types.
//!
//! A plan is an ordered, diffed set of actions that reconciles declared
//! against deployed state. Plans are pure values: planning the same graph
//! and state twice yields identical plans, so a plan carries no timestamps
//! or other ambient data.

use serde::Serialize;

use crate::graph::ResourceKind;

/// A complete reconciliation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Fingerprint of the declaration set this plan is based on.
    pub config_hash: String,
    /// Whether this is a full-teardown plan.
    pub destroy: bool,
    /// Planned actions in execution order.
    pub actions: Vec<Action>,
}

/// A single planned action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    /// Action type.
    pub action_type: ActionType,
    /// Resource id.
    pub resource_id: String,
    /// Resource kind.
    pub resource_kind: ResourceKind,
    /// Reason for this action.
    pub reason: String,
    /// Fingerprint of the declared attributes (absent for deletes).
    pub new_fingerprint: Option<String>,
}

/// Types of actions in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Create a new resource.
    Create,
    /// Update an existing resource.
    Update,
    /// Delete a resource.
    Delete,
    /// No operation.
    Noop,
}

impl Plan {
    /// Returns true if the plan contains no changes.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.actions
            .iter()
            .all(|a| a.action_type == ActionType::Noop)
    }

    /// Returns the number of actions (including noops).
    #[must_use]
    pub const fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns actions that change something.
    #[must_use]
    pub fn changes(&self) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type != ActionType::Noop)
            .collect()
    }

    /// Returns the number of create actions.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.count(ActionType::Create)
    }

    /// Returns the number of update actions.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.count(ActionType::Update)
    }

    /// Returns the number of delete actions.
    #[must_use]
    pub fn delete_count(&self) -> usize {
        self.count(ActionType::Delete)
    }

    /// Returns the number of unchanged resources.
    #[must_use]
    pub fn noop_count(&self) -> usize {
        self.count(ActionType::Noop)
    }

    fn count(&self, action_type: ActionType) -> usize {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .count()
    }
}

impl Action {
    /// Returns a human-readable description of the action.
    #[must_use]
    pub fn description(&self) -> String {
        match self.action_type {
            ActionType::Create => {
                format!("Create {} '{}'", self.resource_kind, self.resource_id)
            }
            ActionType::Update => {
                format!("Update {} '{}'", self.resource_kind, self.resource_id)
            }
            ActionType::Delete => {
                format!("Delete {} '{}'", self.resource_kind, self.resource_id)
            }
            ActionType::Noop => format!("No change for '{}'", self.resource_id),
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Noop => "noop",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action_type, self.resource_id)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_unchanged() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan ({} changes):", self.changes().len())?;
        for (i, action) in self.changes().iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }

        Ok(())
    }
}
