//! Resource dependency graph for the Stackwright provisioning system.
//!
//! This module owns the declaration model and its assembly into a validated
//! DAG:
//! - Resource and reference value types
//! - Graph construction with cycle and dangling-reference detection
//! - Stable topological ordering for plan generation

mod builder;
mod resource;

pub use builder::{Graph, GraphBuilder};
pub use resource::{AttrValue, Reference, Resource, ResourceKind};
