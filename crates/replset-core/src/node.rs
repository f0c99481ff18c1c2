//! Cluster node descriptors.

use serde::{Deserialize, Serialize};

/// Static description of one database process, as declared in config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSpec {
    /// Logical node name, also the replica-set member label in logs.
    pub name: String,

    /// Compose service that runs this node.
    pub service: String,

    /// Host the test process uses to reach the node.
    pub host: String,

    /// Port the test process uses to reach the node.
    pub port: u16,

    /// Election priority; `0` means the node can never become primary.
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Address advertised inside the replica set when it differs from
    /// `host:port` (e.g. the compose service DNS name).
    #[serde(default)]
    pub member_host: Option<String>,
}

fn default_priority() -> u32 {
    1
}

impl NodeSpec {
    pub fn new(name: &str, host: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            service: name.to_string(),
            host: host.to_string(),
            port,
            priority: default_priority(),
            member_host: None,
        }
    }

    /// Override the election priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Override the compose service name.
    pub fn with_service(mut self, service: &str) -> Self {
        self.service = service.to_string();
        self
    }

    /// `host:port` as seen by the test process.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Override the address advertised to other members.
    pub fn with_member_host(mut self, member_host: &str) -> Self {
        self.member_host = Some(member_host.to_string());
        self
    }

    /// Address used in the replica-set member document.
    pub fn member_address(&self) -> String {
        self.member_host.clone().unwrap_or_else(|| self.address())
    }

    pub fn is_primary_candidate(&self) -> bool {
        self.priority > 0
    }
}

/// A node the orchestrator has launched, with its observed readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNode {
    pub spec: NodeSpec,
    pub ready: bool,
}

impl ClusterNode {
    pub fn new(spec: NodeSpec) -> Self {
        Self { spec, ready: false }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// The node expected to win the first election: highest priority, first
/// declared on ties. `None` when no node may become primary.
pub fn preferred_primary(nodes: &[NodeSpec]) -> Option<&NodeSpec> {
    nodes
        .iter()
        .filter(|n| n.is_primary_candidate())
        .fold(None, |best: Option<&NodeSpec>, n| match best {
            Some(b) if b.priority >= n.priority => Some(b),
            _ => Some(n),
        })
}
