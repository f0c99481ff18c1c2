//! Test command execution.

use async_trait::async_trait;
use chrono::Utc;
use replset_core::{CommandRunner, EnvError, Result, RunResult, TestCommand};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{info, warn};

/// Runs the test command as a child process with inherited stdio, so the
/// test runner's output reaches the terminal or CI log directly.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &TestCommand, env: &[(String, String)]) -> Result<RunResult> {
        command.validate()?;
        let started_at = Utc::now();
        let start = Instant::now();

        let mut cmd = Command::new(command.program());
        cmd.args(command.args())
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn()?;
        info!(command = %command.display(), pid = child.id(), "test command started");

        let status = if command.timeout_secs > 0 {
            let limit = Duration::from_secs(command.timeout_secs);
            match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(command = %command.display(), "test command timed out, killing");
                    if let Err(e) = child.kill().await {
                        warn!(error = %e, "failed to kill test command");
                    }
                    return Err(EnvError::CommandTimeout {
                        program: command.program().to_string(),
                        timeout_secs: command.timeout_secs,
                    });
                }
            }
        } else {
            child.wait().await?
        };

        Ok(RunResult {
            exit_code: status.code().unwrap_or(-1),
            duration_ms: start.elapsed().as_millis() as u64,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> TestCommand {
        TestCommand::new(vec!["sh".to_string(), "-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_exit_code_propagated() {
        let result = ProcessRunner.run(&sh("exit 3"), &[]).await.expect("run failed");
        assert_eq!(result.exit_code, 3);
        assert!(!result.passed());
        assert!(result.finished_at >= result.started_at);
    }

    #[tokio::test]
    async fn test_successful_command() {
        let result = ProcessRunner.run(&sh("true"), &[]).await.expect("run failed");
        assert!(result.passed());
    }

    #[tokio::test]
    async fn test_env_injected() {
        let env = vec![(
            "MONGODB_URI".to_string(),
            "mongodb://localhost:27017/?replicaSet=rs0".to_string(),
        )];
        let cmd = sh(r#"test "$MONGODB_URI" = "mongodb://localhost:27017/?replicaSet=rs0""#);
        let result = ProcessRunner.run(&cmd, &env).await.expect("run failed");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "x").unwrap();
        let cmd = sh("test -f marker").with_cwd(dir.path().to_path_buf());
        let result = ProcessRunner.run(&cmd, &[]).await.expect("run failed");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let cmd = sh("sleep 30").with_timeout(1);
        let err = ProcessRunner.run(&cmd, &[]).await.unwrap_err();
        assert!(matches!(err, EnvError::CommandTimeout { timeout_secs: 1, .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_killed_by_signal_maps_to_minus_one() {
        let result = ProcessRunner.run(&sh("kill -9 $$"), &[]).await.expect("run failed");
        assert_eq!(result.exit_code, -1);
        assert!(!result.passed());
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let cmd = TestCommand::new(vec!["definitely-not-a-real-binary-4f2a".to_string()]);
        let err = ProcessRunner.run(&cmd, &[]).await.unwrap_err();
        assert!(matches!(err, EnvError::Io(_)));
    }
}
