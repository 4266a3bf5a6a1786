//! Error types for the Stackwright provisioning system.
//!
//! This module provides a comprehensive error hierarchy for all phases of
//! the provisioning lifecycle: declaration loading, graph construction,
//! state management, provider calls, and plan execution.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Stackwright provisioning system.
#[derive(Debug, Error)]
pub enum StackError {
    /// Declaration file errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource graph errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Provider API errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Plan execution errors.
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Declaration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The declaration file was not found.
    #[error("Declaration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The declaration file could not be parsed.
    #[error("Failed to parse declaration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Declaration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// A reference expression could not be parsed.
    #[error("Invalid reference expression: {expression}")]
    InvalidReference {
        /// The malformed expression.
        expression: String,
    },
}

/// Resource graph errors.
///
/// All graph errors indicate a declaration bug. They are raised during
/// validation or planning, are fatal to the run, and are never retried.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A resource id was declared more than once.
    #[error("Duplicate resource id: {id}")]
    DuplicateId {
        /// The duplicated id.
        id: String,
    },

    /// A referenced resource id is not declared in the graph.
    #[error("Unknown resource id: {id}")]
    UnknownResource {
        /// The undeclared id.
        id: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Dependency cycle detected: {chain}")]
    Cycle {
        /// The offending node sequence, e.g. `a -> b -> a`.
        chain: String,
    },

    /// A reference points at an id absent from the graph.
    #[error("Dangling reference in '{resource}': no resource with id '{target}'")]
    DanglingReference {
        /// Resource whose attributes contain the reference.
        resource: String,
        /// The missing target id.
        target: String,
    },

    /// A reference was resolved before its source resource was applied.
    #[error("Unresolved reference in '{resource}': '{target}.{attribute}' has not been applied")]
    UnresolvedReference {
        /// Resource whose attributes contain the reference.
        resource: String,
        /// The referenced resource id.
        target: String,
        /// The referenced attribute or output name.
        attribute: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Storage backend error.
    #[error("State backend error: {message}")]
    Backend {
        /// Description of the backend error.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Provider API errors.
///
/// Transient variants (`RateLimited`, `Unavailable`, `Network`) are retried
/// with backoff by the executor; all other variants abort the run.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Authentication failed.
    #[error("Provider authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request rejected with a client error.
    #[error("Provider API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Rate limited.
    #[error("Provider rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Provider temporarily unavailable (server-side error).
    #[error("Provider unavailable: {status} - {message}")]
    Unavailable {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with provider: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid response from provider: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Plan execution errors.
#[derive(Debug, Error)]
pub enum ExecError {
    /// An action failed against the provider.
    #[error("Failed to {action} resource '{resource}': {message}")]
    ActionFailed {
        /// Resource id the action targeted.
        resource: String,
        /// The action attempted (create, update, delete).
        action: String,
        /// Underlying provider error.
        message: String,
    },

    /// The retry budget for a transient error was exhausted.
    #[error("Maximum retry attempts ({attempts}) exceeded for '{resource}': {message}")]
    MaxRetriesExceeded {
        /// Resource id the action targeted.
        resource: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last transient error observed.
        message: String,
    },

    /// Execution was cancelled between actions.
    #[error("Execution cancelled after {applied} applied actions")]
    Cancelled {
        /// Number of actions fully applied before the cancellation.
        applied: usize,
    },

    /// The overall deadline elapsed at an action boundary.
    #[error("Deadline exceeded before applying resource '{resource}'")]
    DeadlineExceeded {
        /// The next resource that was not started.
        resource: String,
    },
}

/// Result type alias for Stackwright operations.
pub type Result<T> = std::result::Result<T, StackError>;

impl StackError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(
                ProviderError::RateLimited { .. }
                    | ProviderError::Unavailable { .. }
                    | ProviderError::Network { .. }
            ) | Self::State(StateError::LockFailed { .. })
        )
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub const fn retry_delay_secs(&self) -> Option<u64> {
        match self {
            Self::Provider(ProviderError::RateLimited { retry_after_secs }) => {
                Some(*retry_after_secs)
            }
            Self::Provider(ProviderError::Unavailable { .. } | ProviderError::Network { .. }) => {
                Some(5)
            }
            Self::State(StateError::LockFailed { .. }) => Some(2),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a backend error with the given message.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Returns true if the error is transient and worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Unavailable { .. } | Self::Network { .. }
        )
    }
}
