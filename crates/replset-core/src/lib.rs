//! replset-core: lifecycle orchestration for a local MongoDB replica set
//!
//! Brings a containerised replica set to a known state, runs a test command
//! against it, and tears it down:
//! - Starts every node through a [`ContainerRuntime`]
//! - Polls each node with a [`ReadinessProbe`] until ready or timed out
//! - Applies the [`ReplicaSetConfig`] once through a [`ReplicaSetAdmin`]
//! - Runs the test command with the connection string in its environment
//! - Removes the cluster when tests pass, leaves it running when they fail
//!
//! Docker and process adapters live in the `replset-exec` crate; in-memory
//! fakes for every seam are in [`fakes`].

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod fakes;
pub mod lifecycle;
pub mod node;
pub mod obs;
pub mod orchestrator;
pub mod probe;
pub mod replset;
pub mod report;
pub mod runtime;
pub mod telemetry;

pub use command::{CommandRunner, RunResult, TestCommand};
pub use config::{EnvConfig, DEFAULT_CONFIG_FILE};
pub use connection::{ConnectionString, ReadPreference};
pub use error::{EnvError, Result, TIMEOUT_EXIT_CODE};
pub use lifecycle::LifecycleState;
pub use node::{preferred_primary, ClusterNode, NodeSpec};
pub use obs::EnvSpan;
pub use orchestrator::Orchestrator;
pub use probe::{wait_until_ready, ProbePolicy, ReadinessProbe};
pub use replset::{
    MemberConfig, MemberState, MembershipState, ReplicaSetAdmin, ReplicaSetConfig, DEFAULT_SET_ID,
    PRIMARY_ELECTION_TIMEOUT_MS,
};
pub use report::{write_report_json, RunReport};
pub use runtime::ContainerRuntime;
pub use telemetry::init_tracing;

/// replset-env version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
