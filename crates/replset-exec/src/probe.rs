//! Readiness probes: TCP connect and a mongosh `ping` inside the container.

use async_trait::async_trait;
use replset_core::{ClusterNode, EnvError, ReadinessProbe, Result};
use std::time::Duration;
use tokio::net::TcpStream;

use crate::compose::{non_empty_lines, output_checked, ComposeRuntime};

/// Per-attempt bound so a hung connect cannot eat the whole poll budget.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Ready when a TCP connection to `host:port` succeeds.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    attempt_timeout: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

impl TcpProbe {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self { attempt_timeout }
    }
}

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn probe(&self, node: &ClusterNode) -> Result<()> {
        let addr = node.spec.address();
        match tokio::time::timeout(self.attempt_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(EnvError::Runtime(format!("connect {addr}: {e}"))),
            Err(_) => Err(EnvError::Runtime(format!(
                "connect {addr}: timed out after {}ms",
                self.attempt_timeout.as_millis()
            ))),
        }
    }
}

/// Ready when `db.adminCommand({ ping: 1 }).ok` prints `1` inside the
/// node's container.
#[derive(Debug, Clone)]
pub struct MongoshPingProbe {
    compose: ComposeRuntime,
    attempt_timeout: Duration,
}

impl MongoshPingProbe {
    pub const PING_EVAL: &'static str = "db.adminCommand({ ping: 1 }).ok";

    pub fn new(compose: ComposeRuntime) -> Self {
        Self {
            compose,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }
}

#[async_trait]
impl ReadinessProbe for MongoshPingProbe {
    async fn probe(&self, node: &ClusterNode) -> Result<()> {
        let cmd = self.compose.compose_command(&[
            "exec",
            "-T",
            &node.spec.service,
            "mongosh",
            "--quiet",
            "--eval",
            Self::PING_EVAL,
        ]);
        let output = tokio::time::timeout(self.attempt_timeout, output_checked(cmd, "mongosh ping"))
            .await
            .map_err(|_| EnvError::Runtime(format!("ping {} timed out", node.name())))??;

        let lines = non_empty_lines(&output.stdout);
        match lines.last().map(String::as_str) {
            Some("1") => Ok(()),
            other => Err(EnvError::Runtime(format!(
                "ping {} returned {:?}",
                node.name(),
                other.unwrap_or("")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replset_core::NodeSpec;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_ready_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let node = ClusterNode::new(NodeSpec::new("mongo1", "127.0.0.1", port));

        TcpProbe::default().probe(&node).await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_probe_fails_when_closed() {
        // bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let node = ClusterNode::new(NodeSpec::new("mongo1", "127.0.0.1", port));

        let err = TcpProbe::new(Duration::from_secs(1)).probe(&node).await.unwrap_err();
        assert!(matches!(err, EnvError::Runtime(_)));
    }
}
