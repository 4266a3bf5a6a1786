// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Stackwright
//!
//! A declarative, idempotent infrastructure stack provisioner.
//!
//! ## Overview
//!
//! Stackwright compiles a small, typed declaration of cloud resources and
//! their relationships into a dependency-ordered execution plan, then
//! applies it idempotently:
//!
//! - Declare tables, roles, policies, functions, rules, and bindings in a
//!   YAML file, wiring them together with `${id.attribute}` references
//! - Build a validated dependency graph (no cycles, no dangling references)
//! - Plan a deterministic create/update/delete diff against recorded state
//! - Apply the plan against a provisioning API, resource by resource
//!
//! ## Architecture
//!
//! The system reconciles **declared state** against **deployed state**:
//!
//! 1. **Declared state**: defined in `stackwright.stack.yaml`
//! 2. **Deployed state**: the persisted record of what was provisioned
//! 3. **Planner/Executor**: diff the two and converge them
//!
//! ## Modules
//!
//! - [`config`]: Declaration parsing, validation, and fingerprinting
//! - [`graph`]: Resource model and dependency graph construction
//! - [`state`]: State storage backends (local, S3)
//! - [`provider`]: Provisioning API client
//! - [`planner`]: Plan computation and execution
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: soccer-backend
//!   environment: prod
//!
//! provider:
//!   endpoint: https://provisioner.example/api
//!
//! state:
//!   backend: local
//!
//! resources:
//!   - id: match-table
//!     kind: table
//!     attributes:
//!       name: favorite-team-matches
//!       partition_key: uniqueId
//!       sort_key: matchDateAndTime
//!   - id: lambda-role
//!     kind: role
//!     depends_on: [match-table]
//!     attributes:
//!       service: lambda.amazonaws.com
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, Fingerprinter, StackConfig};
pub use error::{Result, StackError};
pub use graph::{AttrValue, Graph, GraphBuilder, Reference, Resource, ResourceKind};
pub use planner::{
    Action, ActionType, CancelSignal, ExecutionReport, Executor, ExecutorOptions, Plan, Planner,
};
pub use provider::{HttpProvider, Provider};
pub use state::{DeployedState, LocalStateStore, ResourceRecord, S3StateStore, StateStore};
