//! Structured observability hooks for the environment lifecycle.
//!
//! This module provides:
//! - A run-scoped tracing span via the `EnvSpan` RAII guard
//! - Emission functions for lifecycle events: state change, probe attempt,
//!   replica-set applied, test finished, teardown finished

use tracing::info;

use crate::lifecycle::LifecycleState;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// ```ignore
/// let _span = EnvSpan::enter(&run_id.to_string());
/// // every event below carries the run_id field
/// ```
pub struct EnvSpan {
    _span: tracing::span::EnteredSpan,
}

impl EnvSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("replset_env.run", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_state_changed(from: LifecycleState, to: LifecycleState) {
    info!(event = "env.state_changed", from = %from, to = %to);
}

/// Probe attempts are chatty, so only successes are logged at info.
pub fn emit_probe_attempt(node: &str, attempt: u32, ready: bool) {
    if ready {
        info!(event = "probe.ready", node = %node, attempt = attempt);
    } else {
        tracing::debug!(event = "probe.attempt", node = %node, attempt = attempt, ready = ready);
    }
}

pub fn emit_replset_applied(set_id: &str, digest: &str, members: usize) {
    info!(
        event = "replset.applied",
        set_id = %set_id,
        digest = %&digest[..12.min(digest.len())],
        members = members,
    );
}

pub fn emit_test_finished(exit_code: i32, duration_ms: u64) {
    info!(event = "test.finished", exit_code = exit_code, duration_ms = duration_ms);
}

pub fn emit_teardown_finished(state: LifecycleState, remaining: usize) {
    info!(event = "teardown.finished", state = %state, remaining = remaining);
}

/// Teardown step failure (warning level); teardown keeps going.
pub fn emit_teardown_error(target: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(event = "teardown.error", target = %target, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_span_create() {
        let _span = EnvSpan::enter("test-run-id");
    }

    #[test]
    fn test_emitters_accept_short_digest() {
        emit_replset_applied("rs0", "abc", 1);
        emit_state_changed(LifecycleState::NotStarted, LifecycleState::Starting);
        emit_probe_attempt("mongo1", 1, false);
        emit_teardown_error("mongo1", &"boom");
    }
}
