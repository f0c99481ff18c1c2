//! replset-exec: process-boundary adapters for replset-env
//!
//! Implements the `replset-core` seams against real processes:
//! - [`ComposeRuntime`]: nodes as docker compose services
//! - [`TcpProbe`] / [`MongoshPingProbe`]: readiness checks
//! - [`MongoshAdmin`]: replica-set initiation via mongosh
//! - [`ProcessRunner`]: the caller's test command

pub mod admin;
pub mod compose;
pub mod probe;
pub mod runner;

pub use admin::{parse_membership, MongoshAdmin};
pub use compose::ComposeRuntime;
pub use probe::{MongoshPingProbe, TcpProbe, DEFAULT_ATTEMPT_TIMEOUT};
pub use runner::ProcessRunner;

use replset_core::{EnvConfig, Orchestrator, ReadinessProbe, Result};
use std::sync::Arc;

/// Which readiness check to poll nodes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeKind {
    /// TCP connect to the published `host:port`.
    Tcp,
    /// `mongosh` ping inside the node's container.
    #[default]
    Mongosh,
}

/// Wire an orchestrator against docker compose for `config`.
pub fn compose_orchestrator(config: EnvConfig, probe: ProbeKind) -> Result<Orchestrator> {
    let compose = ComposeRuntime::from_config(&config);
    let probe: Arc<dyn ReadinessProbe> = match probe {
        ProbeKind::Tcp => Arc::new(TcpProbe::default()),
        ProbeKind::Mongosh => Arc::new(MongoshPingProbe::new(compose.clone())),
    };
    let admin = MongoshAdmin::from_config(compose.clone(), &config)?;
    Orchestrator::new(
        config,
        Arc::new(compose),
        probe,
        Arc::new(admin),
        Arc::new(ProcessRunner::new()),
    )
}
