//! Plan computation from a graph and deployed state.
//!
//! The planner diffs the declared resource graph against the last-applied
//! state and produces a deterministic, minimal plan. Planning is pure: it
//! reads state, never mutates it, and identical inputs always produce
//! identical plans.

use std::collections::HashMap;
use tracing::debug;

use crate::config::Fingerprinter;
use crate::graph::Graph;
use crate::state::DeployedState;

use super::plan::{Action, ActionType, Plan};

/// Engine for computing plans from declared and deployed state.
#[derive(Debug, Default)]
pub struct Planner {
    /// Attribute fingerprinter.
    fingerprinter: Fingerprinter,
}

impl Planner {
    /// Creates a new planner.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fingerprinter: Fingerprinter::new(),
        }
    }

    /// Computes the plan that reconciles `state` with `graph`.
    ///
    /// Action order: deletes of no-longer-declared resources first (most
    /// recently applied first, so dependents go before their dependencies),
    /// then every declared resource in topological order. Each declared
    /// resource gets exactly one action.
    #[must_use]
    pub fn plan(&self, graph: &Graph, state: &DeployedState) -> Plan {
        let config_hash = self.fingerprinter.fingerprint_all(graph.ordered());
        let mut actions = Vec::new();

        // Resources recorded in state but absent from the declaration.
        for record in state.records_newest_first() {
            if !graph.contains(&record.id) {
                debug!("Resource {} removed from declaration", record.id);
                actions.push(Action {
                    action_type: ActionType::Delete,
                    resource_id: record.id.clone(),
                    resource_kind: record.kind,
                    reason: String::from("Resource removed from declaration"),
                    new_fingerprint: None,
                });
            }
        }

        // Declared resources, dependencies before dependents. Walking in
        // topological order means every referenced dependency's action is
        // already decided when its dependents are diffed.
        let mut decided: HashMap<&str, ActionType> = HashMap::new();

        for resource in graph.ordered() {
            let fingerprint = self.fingerprinter.fingerprint_resource(resource);
            let record = state.get_record(&resource.id);

            let (action_type, reason) = match record {
                None => (
                    ActionType::Create,
                    String::from("Resource declared but not provisioned"),
                ),
                Some(record)
                    if !Fingerprinter::hashes_match(&record.fingerprint, &fingerprint) =>
                {
                    (ActionType::Update, String::from("Declared attributes changed"))
                }
                Some(_) => {
                    // The declaration is unchanged, but a reference into a
                    // resource that will change may resolve to a new value.
                    // Treat that as an update rather than assume stability.
                    let changed_dependency = resource.references().iter().find_map(|r| {
                        decided
                            .get(r.target.as_str())
                            .filter(|&&a| a != ActionType::Noop)
                            .map(|_| r.target.clone())
                    });

                    changed_dependency.map_or_else(
                        || (ActionType::Noop, String::new()),
                        |dep| {
                            (
                                ActionType::Update,
                                format!("Referenced resource '{dep}' will change"),
                            )
                        },
                    )
                }
            };

            debug!("Planned {} for {}", action_type, resource.id);
            decided.insert(resource.id.as_str(), action_type);
            actions.push(Action {
                action_type,
                resource_id: resource.id.clone(),
                resource_kind: resource.kind,
                reason,
                new_fingerprint: Some(fingerprint),
            });
        }

        Plan {
            config_hash,
            destroy: false,
            actions,
        }
    }

    /// Computes a full-teardown plan.
    ///
    /// Declared resources are deleted in reverse create order so dependents
    /// are removed before their dependencies; recorded leftovers absent from
    /// the declaration go first.
    #[must_use]
    pub fn plan_destroy(&self, graph: &Graph, state: &DeployedState) -> Plan {
        let config_hash = self.fingerprinter.fingerprint_all(graph.ordered());
        let mut actions = Vec::new();

        for record in state.records_newest_first() {
            if !graph.contains(&record.id) {
                actions.push(Action {
                    action_type: ActionType::Delete,
                    resource_id: record.id.clone(),
                    resource_kind: record.kind,
                    reason: String::from("Resource removed from declaration"),
                    new_fingerprint: None,
                });
            }
        }

        for resource in graph.reverse_ordered() {
            let (action_type, reason) = if state.get_record(&resource.id).is_some() {
                (ActionType::Delete, String::from("Full teardown"))
            } else {
                (ActionType::Noop, String::from("Not provisioned"))
            };

            actions.push(Action {
                action_type,
                resource_id: resource.id.clone(),
                resource_kind: resource.kind,
                reason,
                new_fingerprint: None,
            });
        }

        Plan {
            config_hash,
            destroy: true,
            actions,
        }
    }
}
