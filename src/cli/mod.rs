//! CLI module for the Stackwright tool.
//!
//! This module provides the command-line interface for validating,
//! planning, and applying stack declarations.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
