//! Planning module for reconciliation operations.
//!
//! This module computes the diff between declared and deployed state,
//! produces deterministic execution plans, and applies them.

mod diff;
mod plan;
mod executor;

pub use diff::Planner;
pub use plan::{Action, ActionType, Plan};
pub use executor::{
    ActionOutcome, ActionResult, CancelSignal, ExecutionReport, Executor, ExecutorOptions,
};
