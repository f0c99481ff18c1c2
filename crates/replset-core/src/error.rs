//! Error types for replset-core

use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Exit code reported when the cluster (or the test command) ran out of time.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Errors that can occur while orchestrating a test environment
#[derive(Error, Debug)]
pub enum EnvError {
    /// A node never answered its readiness probe within the budget
    #[error("node {node} not ready after {attempts} attempt(s) ({waited_ms}ms)")]
    StartupTimeout {
        node: String,
        attempts: u32,
        waited_ms: u64,
    },

    /// The test command exited non-zero
    #[error("test command failed with exit code {exit_code}")]
    TestCommandFailed { exit_code: i32 },

    /// The test command exceeded its own timeout and was killed
    #[error("command `{program}` timed out after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    /// The container runtime or an admin command failed
    #[error("runtime command failed: {0}")]
    Runtime(String),

    /// Configuration rejected during validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Orchestrator asked to move between states that are not connected
    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML config parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl EnvError {
    /// Process exit code the CLI should report for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            EnvError::StartupTimeout { .. } | EnvError::CommandTimeout { .. } => TIMEOUT_EXIT_CODE,
            EnvError::TestCommandFailed { exit_code } if *exit_code != 0 => *exit_code,
            _ => 1,
        }
    }
}

/// Result type for environment operations
pub type Result<T> = std::result::Result<T, EnvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_timeout_exit_code() {
        let err = EnvError::StartupTimeout {
            node: "mongo1".to_string(),
            attempts: 10,
            waited_ms: 9000,
        };
        assert_eq!(err.exit_code(), TIMEOUT_EXIT_CODE);
        assert!(err.to_string().contains("mongo1"));
    }

    #[test]
    fn test_test_command_failed_propagates_code() {
        let err = EnvError::TestCommandFailed { exit_code: 3 };
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_other_errors_exit_one() {
        assert_eq!(EnvError::Runtime("boom".into()).exit_code(), 1);
        assert_eq!(EnvError::InvalidConfig("x".into()).exit_code(), 1);
    }
}
