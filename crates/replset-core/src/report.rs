use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::{EnvError, Result};
use crate::lifecycle::LifecycleState;

/// Summary of one orchestrated run, written for CI consumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub schema_version: String,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub final_state: LifecycleState,
    pub exit_code: i32,
    /// Test command duration in milliseconds.
    pub test_duration_ms: u64,
    /// Whole run, startup included, in milliseconds.
    pub total_duration_ms: u64,
    pub connection_string: String,
    pub replset_digest: String,
    /// Services or processes still running after teardown.
    pub remaining: Vec<String>,
    /// Set when teardown failed after the test command finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_error: Option<String>,
}

impl RunReport {
    pub const SCHEMA_VERSION: &'static str = "1";

    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// `Err(TestCommandFailed)` when the test command exited non-zero.
    pub fn outcome(&self) -> Result<()> {
        if self.passed() {
            Ok(())
        } else {
            Err(EnvError::TestCommandFailed {
                exit_code: self.exit_code,
            })
        }
    }
}

/// Write the report as pretty JSON.
pub fn write_report_json(path: &Path, report: &RunReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn report(exit_code: i32) -> RunReport {
        RunReport {
            schema_version: RunReport::SCHEMA_VERSION.to_string(),
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            final_state: if exit_code == 0 {
                LifecycleState::TornDown
            } else {
                LifecycleState::LeftRunning
            },
            exit_code,
            test_duration_ms: 1200,
            total_duration_ms: 4000,
            connection_string: "mongodb://localhost:27017/?replicaSet=rs0".to_string(),
            replset_digest: "ab".repeat(32),
            remaining: vec![],
            teardown_error: None,
        }
    }

    #[test]
    fn test_outcome_maps_exit_code() {
        assert!(report(0).outcome().is_ok());
        match report(2).outcome() {
            Err(EnvError::TestCommandFailed { exit_code }) => assert_eq!(exit_code, 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_write_report_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let original = report(1);
        write_report_json(&path, &original).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"final_state\": \"left_running\""));
        let parsed: RunReport = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, original);
        assert!(!content.contains("teardown_error"));
    }
}
