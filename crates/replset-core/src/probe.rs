//! Readiness probing: the blocking poll loop run after each node starts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{EnvError, Result};
use crate::node::ClusterNode;
use crate::obs;

/// A lightweight liveness check against one node.
///
/// `Ok(())` means the node accepts requests. Any error counts as a failed
/// attempt; the poll loop decides whether to try again.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self, node: &ClusterNode) -> Result<()>;
}

/// Interval and overall bound of the readiness poll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbePolicy {
    /// Delay between attempts (milliseconds).
    pub interval_ms: u64,
    /// Total budget for one node (seconds).
    pub timeout_secs: u64,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            interval_ms: 1_000,
            timeout_secs: 30,
        }
    }
}

impl ProbePolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            timeout_secs: timeout.as_secs(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Number of probes that fit in the budget, at least one.
    pub fn max_attempts(&self) -> u32 {
        if self.interval_ms == 0 {
            return 1;
        }
        let budget_ms = self.timeout_secs.saturating_mul(1_000);
        let attempts = budget_ms.div_ceil(self.interval_ms);
        attempts.clamp(1, u32::MAX as u64) as u32
    }
}

/// Poll `probe` against `node` until it succeeds or the budget runs out.
///
/// The budget is both an attempt cap and a wall-clock bound: no new attempt
/// starts once `timeout` has elapsed, and the sleep before the next attempt
/// never runs past it. Returns the number of attempts used. There is no
/// sleep after the last failed attempt.
pub async fn wait_until_ready(
    probe: &dyn ReadinessProbe,
    node: &ClusterNode,
    policy: &ProbePolicy,
) -> Result<u32> {
    let start = Instant::now();
    let deadline = start + policy.timeout();
    let max_attempts = policy.max_attempts();
    let mut attempts = 0;

    while attempts < max_attempts {
        attempts += 1;
        match probe.probe(node).await {
            Ok(()) => {
                obs::emit_probe_attempt(node.name(), attempts, true);
                return Ok(attempts);
            }
            Err(e) => {
                obs::emit_probe_attempt(node.name(), attempts, false);
                debug!(node = %node.name(), attempt = attempts, error = %e, "probe failed");
            }
        }

        let now = Instant::now();
        if attempts == max_attempts || now >= deadline {
            break;
        }
        tokio::time::sleep(policy.interval().min(deadline - now)).await;
    }

    Err(EnvError::StartupTimeout {
        node: node.name().to_string(),
        attempts,
        waited_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FlakyProbe;
    use crate::node::NodeSpec;

    fn node() -> ClusterNode {
        ClusterNode::new(NodeSpec::new("mongo1", "localhost", 27017))
    }

    fn policy(timeout_secs: u64) -> ProbePolicy {
        ProbePolicy {
            interval_ms: 1_000,
            timeout_secs,
        }
    }

    #[test]
    fn test_max_attempts() {
        assert_eq!(policy(10).max_attempts(), 10);
        assert_eq!(policy(0).max_attempts(), 1);
        let odd = ProbePolicy {
            interval_ms: 300,
            timeout_secs: 1,
        };
        assert_eq!(odd.max_attempts(), 4);
        let zero_interval = ProbePolicy {
            interval_ms: 0,
            timeout_secs: 5,
        };
        assert_eq!(zero_interval.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_attempt() {
        let probe = FlakyProbe::succeed_on(3);
        let attempts = wait_until_ready(&probe, &node(), &policy(10)).await.unwrap();
        assert_eq!(attempts, 3);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_last_attempt() {
        let probe = FlakyProbe::succeed_on(10);
        let attempts = wait_until_ready(&probe, &node(), &policy(10)).await.unwrap();
        assert_eq!(attempts, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_never_ready() {
        let probe = FlakyProbe::never();
        let err = wait_until_ready(&probe, &node(), &policy(10)).await.unwrap_err();
        match err {
            EnvError::StartupTimeout {
                node,
                attempts,
                waited_ms,
            } => {
                assert_eq!(node, "mongo1");
                assert_eq!(attempts, 10);
                // nine sleeps between ten attempts
                assert_eq!(waited_ms, 9_000);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(probe.calls(), 10);
    }

    /// Fails every attempt after spending `delay` on it.
    struct SlowProbe {
        delay: Duration,
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl ReadinessProbe for SlowProbe {
        async fn probe(&self, node: &ClusterNode) -> Result<()> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Err(EnvError::Runtime(format!("{} not answering", node.name())))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_stop_at_timeout() {
        let probe = SlowProbe {
            delay: Duration::from_secs(5),
            calls: std::sync::atomic::AtomicU32::new(0),
        };
        let started = Instant::now();
        let err = wait_until_ready(&probe, &node(), &policy(10)).await.unwrap_err();

        // 5s attempt, 1s sleep, 5s attempt: past the 10s budget, no third try
        assert!(started.elapsed() <= Duration::from_secs(11));
        assert_eq!(probe.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        match err {
            EnvError::StartupTimeout {
                attempts, waited_ms, ..
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(waited_ms, 11_000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_sleep_clamped_to_budget() {
        let probe = SlowProbe {
            delay: Duration::from_millis(1_500),
            calls: std::sync::atomic::AtomicU32::new(0),
        };
        let slow_interval = ProbePolicy {
            interval_ms: 3_000,
            timeout_secs: 4,
        };
        let started = Instant::now();
        wait_until_ready(&probe, &node(), &slow_interval).await.unwrap_err();

        // 1.5s attempt, then only 2.5s of the 3s interval are left
        assert_eq!(probe.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_millis(5_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_budget_is_not_reached() {
        let probe = FlakyProbe::succeed_on(11);
        assert!(wait_until_ready(&probe, &node(), &policy(10)).await.is_err());
        assert_eq!(probe.calls(), 10);
    }
}
