//! Declaration parser for loading and merging stack files.
//!
//! This module handles loading the stack declaration from YAML files and
//! environment variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result, StackError};
use std::path::Path;
use tracing::{debug, info};

use super::spec::StackConfig;

/// Parser for loading stack declarations.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new declaration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads a declaration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<StackConfig> {
        let path = path.as_ref();
        info!("Loading declaration from: {}", path.display());

        if !path.exists() {
            return Err(StackError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StackError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a declaration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<StackConfig> {
        debug!("Parsing YAML declaration");

        let config: StackConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            StackError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Successfully parsed declaration for project: {}",
            config.project.name
        );
        Ok(config)
    }

    /// Loads a declaration with environment variable overrides.
    ///
    /// Environment variables are checked in the format:
    /// `STACKWRIGHT_<SECTION>_<KEY>` (e.g., `STACKWRIGHT_PROJECT_NAME`)
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<StackConfig> {
        let mut config = self.load_file(path)?;

        // Apply environment overrides
        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Applies environment variable overrides to the declaration.
    fn apply_env_overrides(config: &mut StackConfig) {
        // Project overrides
        if let Ok(name) = std::env::var("STACKWRIGHT_PROJECT_NAME") {
            debug!("Overriding project.name from environment");
            config.project.name = name;
        }

        if let Ok(env) = std::env::var("STACKWRIGHT_PROJECT_ENVIRONMENT") {
            debug!("Overriding project.environment from environment");
            config.project.environment = env;
        }

        // State overrides
        if let Ok(bucket) = std::env::var("STACKWRIGHT_STATE_BUCKET") {
            debug!("Overriding state.bucket from environment");
            config.state.bucket = Some(bucket);
        }

        if let Ok(prefix) = std::env::var("STACKWRIGHT_STATE_PREFIX") {
            debug!("Overriding state.prefix from environment");
            config.state.prefix = Some(prefix);
        }

        // Provider overrides
        if let Ok(endpoint) = std::env::var("STACKWRIGHT_PROVIDER_ENDPOINT") {
            debug!("Overriding provider.endpoint from environment");
            config.provider.endpoint = endpoint;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                StackError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Gets the provider API token from environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not set.
    pub fn get_provider_token() -> Result<String> {
        std::env::var("STACKWRIGHT_PROVIDER_TOKEN").map_err(|_| {
            StackError::Config(ConfigError::MissingEnvVar {
                name: String::from("STACKWRIGHT_PROVIDER_TOKEN"),
            })
        })
    }
}

/// Default declaration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "stackwright.stack.yaml",
    "stackwright.stack.yml",
    "stack.yaml",
    "stack.yml",
];

/// Finds the declaration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no declaration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found declaration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(StackError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceKind;

    #[test]
    fn test_parse_minimal_declaration() {
        let yaml = r"
project:
  name: test-stack
state:
  backend: local
provider:
  endpoint: https://provisioner.example/api
resources: []
";
        let parser = ConfigParser::new();
        let result = parser.parse_yaml(yaml, None);
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config.project.name, "test-stack");
        assert_eq!(config.project.environment, "dev");
        assert_eq!(config.provider.timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_declaration() {
        let yaml = r#"
project:
  name: soccer-backend
  environment: prod

state:
  backend: s3
  bucket: stackwright-state
  prefix: soccer-backend/prod

provider:
  endpoint: https://provisioner.example/api
  timeout_secs: 60

settings:
  destroy_confirmation: false
  max_retries: 5

resources:
  - id: match-table
    kind: table
    attributes:
      name: favorite-team-matches
      partition_key: uniqueId
      sort_key: matchDateAndTime
  - id: lambda-role
    kind: role
    depends_on: [match-table]
    attributes:
      service: lambda.amazonaws.com
  - id: recorder-fn
    kind: function
    attributes:
      handler: "org.recorder.service.SoccerRecorderHandler::handleRequest"
      runtime: java17
      memory_mb: 512
      timeout_secs: 120
      role: ${lambda-role.arn}
"#;
        let parser = ConfigParser::new();
        let result = parser.parse_yaml(yaml, None);
        assert!(result.is_ok());

        let config = result.unwrap();
        assert_eq!(config.project.name, "soccer-backend");
        assert_eq!(config.resources.len(), 3);
        assert_eq!(config.resources[0].kind, ResourceKind::Table);
        assert_eq!(config.resources[1].depends_on, vec!["match-table"]);
        assert!(!config.settings.destroy_confirmation);
        assert_eq!(config.settings.max_retries, 5);
    }

    #[test]
    fn test_missing_file_error() {
        let parser = ConfigParser::new();
        let result = parser.load_file("/nonexistent/stackwright.stack.yaml");
        assert!(matches!(
            result,
            Err(StackError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
