//! Custom error types for Kaizen.
//!
//! This module provides structured error types that enable better
//! error handling, reporting, and recovery throughout the orchestrator.

use thiserror::Error;

use crate::recovery::ClassifiedError;

/// Main error type for Kaizen operations
#[derive(Error, Debug)]
pub enum KaizenError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // =========================================================================
    // Loop Errors
    // =========================================================================
    /// The controller is already running a loop
    #[error("Convergence loop is already running")]
    AlreadyRunning,

    /// Loop execution failed
    #[error("Loop execution error: {message}")]
    Loop { message: String },

    // =========================================================================
    // Agent Errors
    // =========================================================================
    /// No agents enabled for the run
    #[error("No agents enabled - at least one agent id is required")]
    NoAgentsEnabled,

    /// An enabled agent id is not present in the registry
    #[error("Unknown agent id: {agent_id}")]
    UnknownAgent { agent_id: String },

    /// An agent fault escalated under fail-fast mode
    #[error("Agent '{agent_id}' aborted the run: {error}")]
    AgentAbort {
        agent_id: String,
        error: ClassifiedError,
    },

    // =========================================================================
    // Hub Errors
    // =========================================================================
    /// Observer session limit reached
    #[error("Server at capacity ({max_sessions} sessions)")]
    AtCapacity { max_sessions: usize },

    /// Hub operation failed
    #[error("Hub error: {message}")]
    Hub { message: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KaizenError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid-configuration error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a loop error
    pub fn loop_error(message: impl Into<String>) -> Self {
        Self::Loop {
            message: message.into(),
        }
    }

    /// Create a hub error
    pub fn hub(message: impl Into<String>) -> Self {
        Self::Hub {
            message: message.into(),
        }
    }

    /// Check if this error is a controller-level configuration fault.
    ///
    /// Configuration faults raise synchronously before any iteration starts.
    pub fn is_config_fault(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidConfig { .. }
                | Self::NoAgentsEnabled
                | Self::UnknownAgent { .. }
                | Self::AlreadyRunning
        )
    }

    /// Check if this error aborted a run (fail-fast escalation).
    pub fn is_run_abort(&self) -> bool {
        matches!(self, Self::AgentAbort { .. })
    }
}

/// Type alias for Kaizen results
pub type Result<T> = std::result::Result<T, KaizenError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{ErrorSeverity, ErrorType};

    #[test]
    fn test_error_display() {
        let err = KaizenError::UnknownAgent {
            agent_id: "structure".to_string(),
        };
        assert!(err.to_string().contains("structure"));
    }

    #[test]
    fn test_is_config_fault() {
        assert!(KaizenError::config("bad").is_config_fault());
        assert!(KaizenError::NoAgentsEnabled.is_config_fault());
        assert!(KaizenError::AlreadyRunning.is_config_fault());
        assert!(!KaizenError::loop_error("test").is_config_fault());
    }

    #[test]
    fn test_is_run_abort() {
        let err = KaizenError::AgentAbort {
            agent_id: "security".to_string(),
            error: ClassifiedError::new(
                "invalid configuration",
                ErrorType::InvalidConfig,
                ErrorSeverity::Critical,
            ),
        };
        assert!(err.is_run_abort());
        assert!(!err.is_config_fault());
        assert!(err.to_string().contains("security"));
    }

    #[test]
    fn test_invalid_config_display() {
        let err = KaizenError::invalid_config("max_iterations", "must be greater than zero");
        assert!(err.to_string().contains("max_iterations"));
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: KaizenError = io_err.into();
        assert!(matches!(err, KaizenError::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }
}
