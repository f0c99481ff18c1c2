//! Orchestrator lifecycle states and the transitions between them.
//!
//! ```text
//! NotStarted -> Starting -> Ready -> Running -> Passed -> TornDown
//!                   |          |          \--> Failed -> LeftRunning
//!                   |          \--> TornDown            (explicit `down`)
//!                   \--> LeftRunning                    (startup aborted)
//! ```
//!
//! An explicit `down` may also move `NotStarted` and `LeftRunning` to
//! `TornDown`, so a separate invocation can clean up after an earlier one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the orchestrator currently is in a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    NotStarted,
    Starting,
    Ready,
    Running,
    Passed,
    Failed,
    TornDown,
    LeftRunning,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::NotStarted => "not_started",
            LifecycleState::Starting => "starting",
            LifecycleState::Ready => "ready",
            LifecycleState::Running => "running",
            LifecycleState::Passed => "passed",
            LifecycleState::Failed => "failed",
            LifecycleState::TornDown => "torn_down",
            LifecycleState::LeftRunning => "left_running",
        }
    }

    /// `TornDown` and `LeftRunning` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::TornDown | LifecycleState::LeftRunning)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (NotStarted, Starting)
                | (Starting, Ready)
                | (Starting, LeftRunning)
                | (Ready, Running)
                | (Running, Passed)
                | (Running, Failed)
                | (Passed, TornDown)
                | (Failed, LeftRunning)
                | (NotStarted, TornDown)
                | (Ready, TornDown)
                | (LeftRunning, TornDown)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleState::*;

    #[test]
    fn test_happy_path_edges() {
        let path = [NotStarted, Starting, Ready, Running, Passed, TornDown];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_failure_path_edges() {
        let path = [NotStarted, Starting, Ready, Running, Failed, LeftRunning];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]));
        }
    }

    #[test]
    fn test_failed_run_cannot_tear_down_directly() {
        assert!(!Failed.can_transition_to(TornDown));
        assert!(!Running.can_transition_to(TornDown));
        assert!(!NotStarted.can_transition_to(Running));
    }

    #[test]
    fn test_terminal_states() {
        assert!(TornDown.is_terminal());
        assert!(LeftRunning.is_terminal());
        assert!(!Passed.is_terminal());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&LeftRunning).unwrap();
        assert_eq!(json, "\"left_running\"");
    }
}
