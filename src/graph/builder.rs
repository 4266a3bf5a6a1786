//! Graph construction and validation.
//!
//! The [`GraphBuilder`] accumulates resource declarations and assembles them
//! into a validated [`Graph`]: a DAG whose edges come from explicit
//! `depends_on` entries plus implicit edges inferred from every reference
//! found in attribute values.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use crate::error::{GraphError, Result, StackError};

use super::resource::{AttrValue, Reference, Resource, ResourceKind};

/// Builder for assembling resource declarations into a graph.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    /// Declared resources in declaration order.
    resources: Vec<Resource>,
    /// Id to declaration index.
    index: HashMap<String, usize>,
}

/// A validated resource dependency graph.
///
/// Construction guarantees unique ids, no dangling references, and
/// acyclicity. The topological order is stable: ties are broken by
/// declaration order, never by id hash, so identical declarations always
/// produce identical orderings.
#[derive(Debug)]
pub struct Graph {
    /// Resources in declaration order.
    resources: Vec<Resource>,
    /// Id to declaration index.
    index: HashMap<String, usize>,
    /// Dependency indexes per resource (sorted, deduplicated).
    deps: Vec<Vec<usize>>,
    /// Topological order as declaration indexes.
    order: Vec<usize>,
}

impl GraphBuilder {
    /// Creates a new empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a resource.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateId`] if the id is already declared.
    pub fn declare(
        &mut self,
        kind: ResourceKind,
        id: impl Into<String>,
        attributes: BTreeMap<String, AttrValue>,
        depends_on: Vec<String>,
    ) -> Result<&Resource> {
        self.add(Resource::new(kind, id, attributes, depends_on))
    }

    /// Adds an already-constructed resource declaration.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateId`] if the id is already declared.
    pub fn add(&mut self, resource: Resource) -> Result<&Resource> {
        if self.index.contains_key(&resource.id) {
            return Err(StackError::Graph(GraphError::DuplicateId {
                id: resource.id,
            }));
        }

        self.index.insert(resource.id.clone(), self.resources.len());
        self.resources.push(resource);
        Ok(self.resources.last().unwrap_or_else(|| unreachable!()))
    }

    /// Creates a reference to a declared resource's attribute or output.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] if the id is not declared.
    pub fn reference(
        &self,
        resource_id: &str,
        attribute: impl Into<String>,
    ) -> Result<Reference> {
        if !self.index.contains_key(resource_id) {
            return Err(StackError::Graph(GraphError::UnknownResource {
                id: resource_id.to_string(),
            }));
        }
        Ok(Reference::new(resource_id, attribute))
    }

    /// Assembles the declared resources into a validated graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] for a `depends_on` entry
    /// naming an undeclared id, [`GraphError::DanglingReference`] for a
    /// reference to an undeclared id, and [`GraphError::Cycle`] when a
    /// depth-first traversal finds a back edge. On error no graph is
    /// returned, not even partially.
    pub fn build(self) -> Result<Graph> {
        let deps = self.collect_edges()?;
        Self::check_acyclic(&self.resources, &deps)?;
        let order = Self::topological_order(self.resources.len(), &deps);

        Ok(Graph {
            resources: self.resources,
            index: self.index,
            deps,
            order,
        })
    }

    /// Computes the dependency index lists from explicit and implicit edges.
    fn collect_edges(&self) -> Result<Vec<Vec<usize>>> {
        let mut deps = Vec::with_capacity(self.resources.len());

        for resource in &self.resources {
            let mut entries = Vec::new();

            for dep_id in &resource.depends_on {
                let dep_idx = self.index.get(dep_id).ok_or_else(|| {
                    StackError::Graph(GraphError::UnknownResource {
                        id: dep_id.clone(),
                    })
                })?;
                entries.push(*dep_idx);
            }

            for reference in resource.references() {
                let dep_idx = self.index.get(&reference.target).ok_or_else(|| {
                    StackError::Graph(GraphError::DanglingReference {
                        resource: resource.id.clone(),
                        target: reference.target.clone(),
                    })
                })?;
                entries.push(*dep_idx);
            }

            entries.sort_unstable();
            entries.dedup();
            deps.push(entries);
        }

        Ok(deps)
    }

    /// Depth-first cycle detection, reporting the offending node chain.
    fn check_acyclic(resources: &[Resource], deps: &[Vec<usize>]) -> Result<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            node: usize,
            resources: &[Resource],
            deps: &[Vec<usize>],
            marks: &mut [Mark],
            path: &mut Vec<usize>,
        ) -> Result<()> {
            marks[node] = Mark::InProgress;
            path.push(node);

            for &dep in &deps[node] {
                match marks[dep] {
                    Mark::Done => {}
                    Mark::Unvisited => visit(dep, resources, deps, marks, path)?,
                    Mark::InProgress => {
                        // Back edge: the cycle is the path suffix starting at
                        // the revisited node, closed by the node itself.
                        let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                        let chain: Vec<&str> = path[start..]
                            .iter()
                            .chain(std::iter::once(&dep))
                            .map(|&n| resources[n].id.as_str())
                            .collect();
                        return Err(StackError::Graph(GraphError::Cycle {
                            chain: chain.join(" -> "),
                        }));
                    }
                }
            }

            path.pop();
            marks[node] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; resources.len()];
        let mut path = Vec::new();

        for node in 0..resources.len() {
            if marks[node] == Mark::Unvisited {
                visit(node, resources, deps, &mut marks, &mut path)?;
            }
        }

        Ok(())
    }

    /// Kahn's algorithm with a min-heap over declaration indexes, so ties
    /// resolve in declaration order.
    fn topological_order(len: usize, deps: &[Vec<usize>]) -> Vec<usize> {
        let mut indegree = vec![0usize; len];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); len];

        for (node, entries) in deps.iter().enumerate() {
            indegree[node] = entries.len();
            for &dep in entries {
                dependents[dep].push(node);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..len)
            .filter(|&node| indegree[node] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(len);
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &dependent in &dependents[node] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        order
    }
}

impl Graph {
    /// Returns the number of resources in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if the graph has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Looks up a resource by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.index.get(id).map(|&idx| &self.resources[idx])
    }

    /// Returns true if a resource with the given id is declared.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Iterates resources in topological order (dependencies first).
    pub fn ordered(&self) -> impl Iterator<Item = &Resource> {
        self.order.iter().map(|&idx| &self.resources[idx])
    }

    /// Iterates resources in reverse topological order (dependents first).
    pub fn reverse_ordered(&self) -> impl Iterator<Item = &Resource> {
        self.order.iter().rev().map(|&idx| &self.resources[idx])
    }

    /// Returns the ids of a resource's dependencies (explicit and implicit).
    #[must_use]
    pub fn dependency_ids(&self, id: &str) -> Vec<&str> {
        self.index.get(id).map_or_else(Vec::new, |&idx| {
            self.deps[idx]
                .iter()
                .map(|&dep| self.resources[dep].id.as_str())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, AttrValue)]) -> BTreeMap<String, AttrValue> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn string_attr(value: &str) -> AttrValue {
        AttrValue::String(value.to_string())
    }

    fn ref_attr(target: &str, attribute: &str) -> AttrValue {
        AttrValue::Ref(Reference::new(target, attribute))
    }

    /// Builds the declaration shape of the original backend stack: two
    /// tables, a role depending on both, and a function referencing the
    /// role's output.
    fn backend_stack() -> GraphBuilder {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                ResourceKind::Table,
                "match-table",
                attrs(&[("name", string_attr("favorite-team-matches"))]),
                vec![],
            )
            .expect("declare match-table");
        builder
            .declare(
                ResourceKind::Table,
                "team-table",
                attrs(&[("name", string_attr("all-soccer-teams"))]),
                vec![],
            )
            .expect("declare team-table");
        builder
            .declare(
                ResourceKind::Role,
                "lambda-role",
                attrs(&[("service", string_attr("lambda.amazonaws.com"))]),
                vec![String::from("match-table"), String::from("team-table")],
            )
            .expect("declare lambda-role");
        builder
            .declare(
                ResourceKind::Function,
                "recorder-fn",
                attrs(&[("role", ref_attr("lambda-role", "arn"))]),
                vec![],
            )
            .expect("declare recorder-fn");
        builder
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .declare(ResourceKind::Table, "t", BTreeMap::new(), vec![])
            .expect("first declaration");

        let err = builder
            .declare(ResourceKind::Role, "t", BTreeMap::new(), vec![])
            .expect_err("redeclaration must fail");
        assert!(matches!(
            err,
            StackError::Graph(GraphError::DuplicateId { ref id }) if id == "t"
        ));
    }

    #[test]
    fn test_reference_requires_declared_id() {
        let builder = backend_stack();
        assert!(builder.reference("lambda-role", "arn").is_ok());

        let err = builder
            .reference("missing", "arn")
            .expect_err("unknown id must fail");
        assert!(matches!(
            err,
            StackError::Graph(GraphError::UnknownResource { ref id }) if id == "missing"
        ));
    }

    #[test]
    fn test_order_puts_dependencies_first() {
        let graph = backend_stack().build().expect("graph should build");

        let ids: Vec<&str> = graph.ordered().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["match-table", "team-table", "lambda-role", "recorder-fn"]
        );

        // Property: every dependency precedes its dependent.
        for (pos, resource) in graph.ordered().enumerate() {
            for dep in graph.dependency_ids(&resource.id) {
                let dep_pos = graph
                    .ordered()
                    .position(|r| r.id == dep)
                    .expect("dependency is in the order");
                assert!(dep_pos < pos, "{dep} must precede {}", resource.id);
            }
        }
    }

    #[test]
    fn test_independent_resources_keep_declaration_order() {
        let mut builder = GraphBuilder::new();
        for id in ["zulu", "alpha", "mike"] {
            builder
                .declare(ResourceKind::Table, id, BTreeMap::new(), vec![])
                .expect("declare");
        }

        let graph = builder.build().expect("graph should build");
        let ids: Vec<&str> = graph.ordered().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_cycle_detected_with_chain() {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                ResourceKind::Role,
                "a",
                BTreeMap::new(),
                vec![String::from("b")],
            )
            .expect("declare a");
        builder
            .declare(
                ResourceKind::Policy,
                "b",
                attrs(&[("role", ref_attr("a", "arn"))]),
                vec![],
            )
            .expect("declare b");

        let err = builder.build().expect_err("cycle must fail");
        let StackError::Graph(GraphError::Cycle { chain }) = err else {
            panic!("expected a cycle error, got: {err}");
        };
        assert!(chain.contains("a") && chain.contains("b"), "chain: {chain}");
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                ResourceKind::Rule,
                "loop",
                BTreeMap::new(),
                vec![String::from("loop")],
            )
            .expect("declare");

        assert!(matches!(
            builder.build().expect_err("self-dependency must fail"),
            StackError::Graph(GraphError::Cycle { .. })
        ));
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                ResourceKind::Function,
                "fn",
                attrs(&[("role", ref_attr("ghost-role", "arn"))]),
                vec![],
            )
            .expect("declare");

        let err = builder.build().expect_err("dangling reference must fail");
        assert!(matches!(
            err,
            StackError::Graph(GraphError::DanglingReference { ref resource, ref target })
                if resource == "fn" && target == "ghost-role"
        ));
    }

    #[test]
    fn test_unknown_explicit_dependency_rejected() {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                ResourceKind::Role,
                "role",
                BTreeMap::new(),
                vec![String::from("nowhere")],
            )
            .expect("declare");

        assert!(matches!(
            builder.build().expect_err("unknown dependency must fail"),
            StackError::Graph(GraphError::UnknownResource { ref id }) if id == "nowhere"
        ));
    }

    #[test]
    fn test_reverse_order_reverses_create_order() {
        let graph = backend_stack().build().expect("graph should build");
        let forward: Vec<&str> = graph.ordered().map(|r| r.id.as_str()).collect();
        let mut backward: Vec<&str> = graph.reverse_ordered().map(|r| r.id.as_str()).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }
}
