//! Test command description, its outcome, and the runner seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{EnvError, Result};

/// The caller's test process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCommand {
    /// Command to execute (first element is the executable).
    pub argv: Vec<String>,

    /// Working directory; inherits the orchestrator's when `None`.
    pub cwd: Option<PathBuf>,

    /// Kill the command after this many seconds; `0` disables the limit.
    pub timeout_secs: u64,
}

impl TestCommand {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            cwd: None,
            timeout_secs: 0,
        }
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    pub fn validate(&self) -> Result<()> {
        if self.program().is_empty() {
            return Err(EnvError::InvalidConfig("test command is empty".to_string()));
        }
        Ok(())
    }

    /// Shell-ish rendering for logs.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Outcome of the test invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunResult {
    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes the test process with extra environment variables.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &TestCommand, env: &[(String, String)]) -> Result<RunResult>;
}
