//! Environment orchestrator: sequences the cluster lifecycle around a test run.
//!
//! The orchestrator drives four collaborators, each behind a trait object:
//! a [`ContainerRuntime`] to start and stop nodes, a [`ReadinessProbe`]
//! polled after startup, a [`ReplicaSetAdmin`] that applies the topology once,
//! and a [`CommandRunner`] for the test process.
//!
//! Control flow is strictly sequential. The readiness poll is the only
//! suspension point.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::command::{CommandRunner, RunResult, TestCommand};
use crate::config::EnvConfig;
use crate::connection::ConnectionString;
use crate::error::{EnvError, Result};
use crate::lifecycle::LifecycleState;
use crate::node::ClusterNode;
use crate::obs::{self, EnvSpan};
use crate::probe::{wait_until_ready, ReadinessProbe};
use crate::replset::{MembershipState, ReplicaSetAdmin, ReplicaSetConfig};
use crate::report::RunReport;
use crate::runtime::ContainerRuntime;

pub struct Orchestrator {
    config: EnvConfig,
    runtime: Arc<dyn ContainerRuntime>,
    probe: Arc<dyn ReadinessProbe>,
    admin: Arc<dyn ReplicaSetAdmin>,
    runner: Arc<dyn CommandRunner>,
    run_id: Uuid,
    state: LifecycleState,
    history: Vec<LifecycleState>,
    nodes: Vec<ClusterNode>,
    membership: Option<MembershipState>,
}

impl Orchestrator {
    /// Create an orchestrator for a validated config.
    pub fn new(
        config: EnvConfig,
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn ReadinessProbe>,
        admin: Arc<dyn ReplicaSetAdmin>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        config.validate()?;
        let nodes = config.nodes.iter().cloned().map(ClusterNode::new).collect();
        Ok(Self {
            config,
            runtime,
            probe,
            admin,
            runner,
            run_id: Uuid::new_v4(),
            state: LifecycleState::NotStarted,
            history: vec![LifecycleState::NotStarted],
            nodes,
            membership: None,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every state visited so far, starting with `NotStarted`.
    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn membership(&self) -> Option<&MembershipState> {
        self.membership.as_ref()
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn connection_string(&self) -> Result<ConnectionString> {
        self.config.connection_string()
    }

    /// Services still running according to the runtime.
    pub async fn remaining(&self) -> Result<Vec<String>> {
        self.runtime.running().await
    }

    fn transition(&mut self, to: LifecycleState) -> Result<()> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(EnvError::InvalidTransition { from, to });
        }
        self.state = to;
        self.history.push(to);
        obs::emit_state_changed(from, to);
        Ok(())
    }

    /// Abort startup: the cluster stays in whatever state it reached.
    fn abort_startup(&mut self, err: EnvError) -> EnvError {
        if self.state == LifecycleState::Starting {
            // Starting -> LeftRunning is always a valid edge
            let _ = self.transition(LifecycleState::LeftRunning);
        }
        err
    }

    /// Launch every node in declaration order, then wait until each one
    /// answers its readiness probe.
    pub async fn start_cluster(&mut self) -> Result<()> {
        self.transition(LifecycleState::Starting)?;

        for i in 0..self.nodes.len() {
            let spec = self.nodes[i].spec.clone();
            info!(node = %spec.name, service = %spec.service, "starting node");
            if let Err(e) = self.runtime.start_node(&spec).await {
                return Err(self.abort_startup(e));
            }
        }

        let policy = self.config.probe;
        for i in 0..self.nodes.len() {
            let outcome = wait_until_ready(self.probe.as_ref(), &self.nodes[i], &policy).await;
            match outcome {
                Ok(attempts) => {
                    info!(node = %self.nodes[i].name(), attempts, "node ready");
                    self.nodes[i].ready = true;
                }
                Err(e) => return Err(self.abort_startup(e)),
            }
        }
        Ok(())
    }

    /// Apply the replica-set topology. Re-applying while `Ready` is allowed
    /// and leaves the same membership.
    pub async fn apply_replica_set_config(
        &mut self,
        config: &ReplicaSetConfig,
    ) -> Result<MembershipState> {
        match self.state {
            LifecycleState::Starting | LifecycleState::Ready => {}
            from => {
                return Err(EnvError::InvalidTransition {
                    from,
                    to: LifecycleState::Ready,
                })
            }
        }
        if let Some(node) = self.nodes.iter().find(|n| !n.ready) {
            return Err(EnvError::InvalidConfig(format!(
                "node {} is not ready; start the cluster first",
                node.name()
            )));
        }

        let membership = match self.admin.apply(config).await {
            Ok(m) => m,
            Err(e) => return Err(self.abort_startup(e)),
        };
        if membership != config.expected_membership() {
            warn!(
                set_id = %membership.set_id,
                members = membership.members.len(),
                "cluster reports a membership different from the applied config"
            );
        }
        obs::emit_replset_applied(&config.id, &config.digest(), membership.members.len());

        if self.state == LifecycleState::Starting {
            self.transition(LifecycleState::Ready)?;
        }
        self.membership = Some(membership.clone());
        Ok(membership)
    }

    /// Start, wait and initialise: the cluster is ready for tests afterwards.
    pub async fn up(&mut self) -> Result<ConnectionString> {
        let replset = self.config.replica_set_config()?;
        self.start_cluster().await?;
        self.apply_replica_set_config(&replset).await?;
        let uri = self.connection_string()?;
        info!(uri = %uri, "cluster ready");
        Ok(uri)
    }

    /// Run the test command with the connection string injected. The exit
    /// code is returned unchanged; the command is never retried.
    pub async fn run_test_command(&mut self, command: &TestCommand) -> Result<RunResult> {
        command.validate()?;
        if self.state != LifecycleState::Ready {
            return Err(EnvError::InvalidTransition {
                from: self.state,
                to: LifecycleState::Running,
            });
        }
        let env = vec![(
            self.config.uri_env_var.clone(),
            self.connection_string()?.to_string(),
        )];

        self.transition(LifecycleState::Running)?;
        info!(command = %command.display(), "running test command");

        match self.runner.run(command, &env).await {
            Ok(result) => {
                obs::emit_test_finished(result.exit_code, result.duration_ms);
                if result.passed() {
                    self.transition(LifecycleState::Passed)?;
                } else {
                    self.transition(LifecycleState::Failed)?;
                }
                Ok(result)
            }
            Err(e) => {
                self.transition(LifecycleState::Failed)?;
                Err(e)
            }
        }
    }

    /// Remove the setup container; on a passed run also remove the cluster,
    /// on a failed run leave it running for inspection.
    pub async fn teardown(&mut self) -> Result<()> {
        let passed = match self.state {
            LifecycleState::Passed => true,
            LifecycleState::Failed => false,
            from => {
                return Err(EnvError::InvalidTransition {
                    from,
                    to: LifecycleState::TornDown,
                })
            }
        };

        let mut first_error = self.remove_setup().await.err();
        if passed {
            if let Err(e) = self.stop_nodes().await {
                first_error.get_or_insert(e);
            }
            self.transition(LifecycleState::TornDown)?;
        } else {
            info!("test failed, leaving cluster running for inspection");
            self.transition(LifecycleState::LeftRunning)?;
        }

        self.finish_teardown().await;
        first_error.map_or(Ok(()), Err)
    }

    /// Unconditional teardown of setup container and cluster.
    pub async fn down(&mut self) -> Result<()> {
        match self.state {
            LifecycleState::Starting | LifecycleState::Running | LifecycleState::TornDown => {
                return Err(EnvError::InvalidTransition {
                    from: self.state,
                    to: LifecycleState::TornDown,
                });
            }
            LifecycleState::Failed => self.transition(LifecycleState::LeftRunning)?,
            _ => {}
        }

        let mut first_error = self.remove_setup().await.err();
        if let Err(e) = self.stop_nodes().await {
            first_error.get_or_insert(e);
        }
        self.transition(LifecycleState::TornDown)?;
        self.finish_teardown().await;
        first_error.map_or(Ok(()), Err)
    }

    /// Full lifecycle: `up`, run the command, `teardown`.
    ///
    /// A startup failure aborts before the command runs and is returned as
    /// the error. A failing command is not an error here: inspect
    /// [`RunReport::exit_code`] or [`RunReport::outcome`]. Once the command
    /// has finished, teardown failures are logged and recorded in
    /// [`RunReport::teardown_error`] instead of discarding the result.
    pub async fn run(&mut self, command: &TestCommand) -> Result<RunReport> {
        let run_id = self.run_id.to_string();
        let _span = EnvSpan::enter(&run_id);
        let start = Instant::now();

        command.validate()?;
        let connection_string = self.up().await?.to_string();
        let replset_digest = self.config.replica_set_config()?.digest();

        let result = match self.run_test_command(command).await {
            Ok(result) => result,
            Err(e) => {
                if let Err(teardown_err) = self.teardown().await {
                    obs::emit_teardown_error("cluster", &teardown_err);
                }
                return Err(e);
            }
        };
        let teardown_error = match self.teardown().await {
            Ok(()) => None,
            Err(e) => {
                obs::emit_teardown_error("cluster", &e);
                Some(e.to_string())
            }
        };

        let remaining = match self.remaining().await {
            Ok(remaining) => remaining,
            Err(e) => {
                obs::emit_teardown_error("status", &e);
                Vec::new()
            }
        };
        Ok(RunReport {
            schema_version: RunReport::SCHEMA_VERSION.to_string(),
            run_id: self.run_id,
            generated_at: Utc::now(),
            final_state: self.state,
            exit_code: result.exit_code,
            test_duration_ms: result.duration_ms,
            total_duration_ms: start.elapsed().as_millis() as u64,
            connection_string,
            replset_digest,
            remaining,
            teardown_error,
        })
    }

    async fn remove_setup(&self) -> Result<()> {
        self.runtime.remove_setup().await.inspect_err(|e| {
            obs::emit_teardown_error("setup", e);
        })
    }

    /// Stop nodes in reverse start order; keeps going past failures.
    async fn stop_nodes(&mut self) -> Result<()> {
        let mut first_error = None;
        for node in self.nodes.iter_mut().rev() {
            match self.runtime.stop_node(&node.spec).await {
                Ok(()) => node.ready = false,
                Err(e) => {
                    obs::emit_teardown_error(&node.spec.name, &e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn finish_teardown(&self) {
        let remaining = match self.runtime.running().await {
            Ok(r) => r.len(),
            Err(e) => {
                obs::emit_teardown_error("status", &e);
                0
            }
        };
        obs::emit_teardown_finished(self.state, remaining);
    }
}
