//! Container runtime seam.

use async_trait::async_trait;

use crate::error::Result;
use crate::node::NodeSpec;

/// Starts and stops the external processes that make up the cluster.
///
/// The runtime owns two kinds of resources: one container per cluster node,
/// and the transient setup container that ran the initialisation script.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Launch the node's container (detached). Must not wait for readiness.
    async fn start_node(&self, node: &NodeSpec) -> Result<()>;

    /// Stop and remove the node's container.
    async fn stop_node(&self, node: &NodeSpec) -> Result<()>;

    /// Stop and remove the transient setup container, if any.
    async fn remove_setup(&self) -> Result<()>;

    /// Names of the services/processes still running.
    async fn running(&self) -> Result<Vec<String>>;
}
