//! Declaration validation for stack files.
//!
//! This module provides comprehensive validation of stack declarations,
//! ensuring all values are valid and consistent before any graph is built
//! or plan computed.

use crate::error::{ConfigError, Result, StackError};
use crate::graph::ResourceKind;
use std::collections::HashSet;
use tracing::debug;

use super::spec::{ResourceConfig, StackConfig, StateBackend};

/// Validator for stack declarations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Required attributes per resource kind.
const REQUIRED_ATTRIBUTES: &[(ResourceKind, &[&str])] = &[
    (ResourceKind::Table, &["name", "partition_key"]),
    (ResourceKind::Role, &["service"]),
    (ResourceKind::Policy, &["statements"]),
    (ResourceKind::Function, &["handler", "runtime"]),
    (ResourceKind::Rule, &["schedule"]),
    (ResourceKind::Binding, &["rule", "target"]),
];

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a stack declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self, config: &StackConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_project(config, &mut result);
        Self::validate_state(&config.state, &mut result);
        Self::validate_provider(config, &mut result);
        Self::validate_settings(config, &mut result);
        Self::validate_resources(&config.resources, &mut result);

        if result.errors.is_empty() {
            debug!("Declaration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(StackError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates project configuration.
    fn validate_project(config: &StackConfig, result: &mut ValidationResult) {
        let project = &config.project;

        if project.name.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: String::from("Project name cannot be empty"),
            });
        } else if !is_valid_name(&project.name) {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: format!(
                    "Project name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    project.name
                ),
            });
        }

        if project.environment.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("project.environment"),
                message: String::from("Environment cannot be empty"),
            });
        }
    }

    /// Validates state configuration.
    fn validate_state(state: &super::spec::StateConfig, result: &mut ValidationResult) {
        match state.backend {
            StateBackend::S3 => {
                if state.bucket.is_none() || state.bucket.as_ref().is_some_and(String::is_empty) {
                    result.errors.push(ValidationError {
                        field: String::from("state.bucket"),
                        message: String::from("S3 bucket name is required when using S3 backend"),
                    });
                }
            }
            StateBackend::Local => {
                // Local backend is always valid
            }
        }
    }

    /// Validates provider configuration.
    fn validate_provider(config: &StackConfig, result: &mut ValidationResult) {
        if config.provider.endpoint.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("provider.endpoint"),
                message: String::from("Provider endpoint cannot be empty"),
            });
        } else if !config.provider.endpoint.starts_with("http://")
            && !config.provider.endpoint.starts_with("https://")
        {
            result.errors.push(ValidationError {
                field: String::from("provider.endpoint"),
                message: format!(
                    "Provider endpoint must be an http(s) URL: {}",
                    config.provider.endpoint
                ),
            });
        }

        if config.provider.timeout_secs == 0 {
            result.errors.push(ValidationError {
                field: String::from("provider.timeout_secs"),
                message: String::from("Provider timeout must be at least 1 second"),
            });
        }
    }

    /// Validates execution settings.
    fn validate_settings(config: &StackConfig, result: &mut ValidationResult) {
        let settings = &config.settings;

        if settings.max_retries == 0 {
            result.errors.push(ValidationError {
                field: String::from("settings.max_retries"),
                message: String::from("max_retries must be at least 1"),
            });
        }

        if settings.retry_base_ms == 0 {
            result.errors.push(ValidationError {
                field: String::from("settings.retry_base_ms"),
                message: String::from("retry_base_ms must be at least 1"),
            });
        }

        if !settings.destroy_confirmation {
            result.warnings.push(String::from(
                "settings.destroy_confirmation is disabled: destroy will not prompt",
            ));
        }
    }

    /// Validates all resource declarations.
    fn validate_resources(resources: &[ResourceConfig], result: &mut ValidationResult) {
        if resources.is_empty() {
            result
                .warnings
                .push(String::from("No resources declared in the stack"));
            return;
        }

        let declared_ids: HashSet<&str> = resources.iter().map(|r| r.id.as_str()).collect();
        let mut seen_ids = HashSet::new();

        for (i, resource) in resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            // Validate unique id
            if seen_ids.contains(&resource.id) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.id"),
                    message: format!("Duplicate resource id: {}", resource.id),
                });
            } else {
                seen_ids.insert(&resource.id);
            }

            // Validate id format
            if !is_valid_name(&resource.id) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.id"),
                    message: format!(
                        "Resource id '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        resource.id
                    ),
                });
            }

            Self::validate_required_attributes(resource, &prefix, result);
            Self::validate_depends_on(resource, &prefix, &declared_ids, result);
        }
    }

    /// Validates kind-specific required attributes.
    fn validate_required_attributes(
        resource: &ResourceConfig,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        let required = REQUIRED_ATTRIBUTES
            .iter()
            .find(|(kind, _)| *kind == resource.kind)
            .map_or(&[][..], |(_, attrs)| *attrs);

        for attr in required {
            if !resource.attributes.contains_key(*attr) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.attributes.{attr}"),
                    message: format!(
                        "Resource '{}' of kind '{}' requires attribute '{attr}'",
                        resource.id, resource.kind
                    ),
                });
            }
        }
    }

    /// Validates explicit dependency entries.
    fn validate_depends_on(
        resource: &ResourceConfig,
        prefix: &str,
        declared_ids: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        let mut seen = HashSet::new();

        for (i, dep) in resource.depends_on.iter().enumerate() {
            if dep == &resource.id {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.depends_on[{i}]"),
                    message: format!("Resource '{}' cannot depend on itself", resource.id),
                });
            }

            if !declared_ids.contains(dep.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.depends_on[{i}]"),
                    message: format!("Unknown resource id in depends_on: {dep}"),
                });
            }

            if !seen.insert(dep) {
                result.warnings.push(format!(
                    "{prefix}.depends_on[{i}]: duplicate dependency '{dep}'"
                ));
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    let mut chars = name.chars();

    // First character must be a letter
    if let Some(first) = chars.next()
        && !first.is_ascii_lowercase()
    {
        return false;
    }

    // Rest must be lowercase alphanumeric or hyphen
    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return false;
        }
    }

    // Cannot end with hyphen
    if name.ends_with('-') {
        return false;
    }

    // Cannot have consecutive hyphens
    if name.contains("--") {
        return false;
    }

    true
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> StackConfig {
        ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("yaml should parse")
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("match-table"));
        assert!(is_valid_name("my-stack-123"));
        assert!(is_valid_name("a"));
        assert!(is_valid_name("backend"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Match-Table")); // uppercase
        assert!(!is_valid_name("123-table")); // starts with number
        assert!(!is_valid_name("match_table")); // underscore
        assert!(!is_valid_name("table-")); // ends with hyphen
        assert!(!is_valid_name("match--table")); // consecutive hyphens
    }

    #[test]
    fn test_valid_declaration_passes() {
        let config = parse(
            r"
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
",
        );

        let result = ConfigValidator::new()
            .validate(&config)
            .expect("validation should pass");
        assert!(result.is_valid());
    }

    #[test]
    fn test_missing_required_attribute_rejected() {
        let config = parse(
            r"
project:
  name: backend
state:
  backend: local
provider:
  endpoint: https://provisioner.example/api
resources:
  - id: recorder-fn
    kind: function
    attributes:
      handler: app.handler
",
        );

        let err = ConfigValidator::new()
            .validate(&config)
            .expect_err("missing runtime must fail");
        assert!(err.to_string().contains("runtime"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let config = parse(
            r"
project:
  name: backend
state:
  backend: local
provider:
  endpoint: https://provisioner.example/api
resources:
  - id: match-table
    kind: table
    attributes: { name: a, partition_key: pk }
  - id: match-table
    kind: table
    attributes: { name: b, partition_key: pk }
",
        );

        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_unknown_depends_on_rejected() {
        let config = parse(
            r"
project:
  name: backend
state:
  backend: local
provider:
  endpoint: https://provisioner.example/api
resources:
  - id: lambda-role
    kind: role
    depends_on: [ghost-table]
    attributes: { service: lambda.amazonaws.com }
",
        );

        let err = ConfigValidator::new()
            .validate(&config)
            .expect_err("unknown dependency must fail");
        assert!(err.to_string().contains("ghost-table"));
    }

    #[test]
    fn test_s3_backend_requires_bucket() {
        let config = parse(
            r"
project:
  name: backend
state:
  backend: s3
provider:
  endpoint: https://provisioner.example/api
resources: []
",
        );

        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_empty_resources_is_a_warning() {
        let config = parse(
            r"
project:
  name: backend
state:
  backend: local
provider:
  endpoint: https://provisioner.example/api
resources: []
",
        );

        let result = ConfigValidator::new()
            .validate(&config)
            .expect("validation should pass");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }
}
