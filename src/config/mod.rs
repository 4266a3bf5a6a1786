//! Declaration module for the Stackwright provisioning system.
//!
//! This module handles all declaration-related functionality:
//! - Parsing and deserializing `stackwright.stack.yaml`
//! - Validation of declaration values
//! - Computing attribute fingerprints for change detection

mod spec;
mod parser;
mod validator;
mod hash;

pub use spec::{
    ProjectConfig, ProviderConfig, ResourceConfig, SettingsConfig, StackConfig, StateBackend,
    StateConfig,
};
pub use parser::{ConfigParser, find_config_file};
pub use validator::ConfigValidator;
pub use hash::Fingerprinter;
