//! In-memory fakes for the orchestrator seams (testing only)
//!
//! Provides `FakeRuntime`, `FlakyProbe`, `MemoryReplicaSetAdmin` and
//! `ScriptedRunner` that satisfy the trait contracts without docker.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::command::{CommandRunner, RunResult, TestCommand};
use crate::error::{EnvError, Result};
use crate::node::{ClusterNode, NodeSpec};
use crate::probe::ReadinessProbe;
use crate::replset::{MembershipState, ReplicaSetAdmin, ReplicaSetConfig};
use crate::runtime::ContainerRuntime;

// ---------------------------------------------------------------------------
// FakeRuntime
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RuntimeState {
    running: Vec<String>,
    setup_running: bool,
    log: Vec<String>,
}

/// Container runtime that tracks running services in memory.
///
/// When a setup service is configured it comes up together with the first
/// node, mirroring a compose `depends_on` one-shot container.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    setup_service: Option<String>,
    fail_start: Option<String>,
    fail_stop: Option<String>,
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setup(setup_service: &str) -> Self {
        Self {
            setup_service: Some(setup_service.to_string()),
            ..Self::default()
        }
    }

    /// Make `start_node` fail for the named service.
    pub fn failing_start(mut self, service: &str) -> Self {
        self.fail_start = Some(service.to_string());
        self
    }

    /// Make `stop_node` fail for the named service; it keeps running.
    pub fn failing_stop(mut self, service: &str) -> Self {
        self.fail_stop = Some(service.to_string());
        self
    }

    /// Ordered log of runtime calls, e.g. `start:mongo1`.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn start_node(&self, node: &NodeSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("start:{}", node.service));
        if self.fail_start.as_deref() == Some(node.service.as_str()) {
            return Err(EnvError::Runtime(format!("cannot start {}", node.service)));
        }
        if !state.running.contains(&node.service) {
            state.running.push(node.service.clone());
        }
        if self.setup_service.is_some() {
            state.setup_running = true;
        }
        Ok(())
    }

    async fn stop_node(&self, node: &NodeSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.log.push(format!("stop:{}", node.service));
        if self.fail_stop.as_deref() == Some(node.service.as_str()) {
            return Err(EnvError::Runtime(format!("cannot stop {}", node.service)));
        }
        state.running.retain(|s| s != &node.service);
        Ok(())
    }

    async fn remove_setup(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(setup) = &self.setup_service {
            state.log.push(format!("remove_setup:{}", setup));
        }
        state.setup_running = false;
        Ok(())
    }

    async fn running(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut running = state.running.clone();
        if let (true, Some(setup)) = (state.setup_running, &self.setup_service) {
            running.push(setup.clone());
        }
        Ok(running)
    }
}

// ---------------------------------------------------------------------------
// FlakyProbe
// ---------------------------------------------------------------------------

/// Probe that fails until its Nth call, or forever.
#[derive(Debug)]
pub struct FlakyProbe {
    succeed_on: Option<u32>,
    calls: AtomicU32,
}

impl FlakyProbe {
    /// Succeeds on call number `n` (1-based) and every call after it.
    pub fn succeed_on(n: u32) -> Self {
        Self {
            succeed_on: Some(n),
            calls: AtomicU32::new(0),
        }
    }

    pub fn always() -> Self {
        Self::succeed_on(1)
    }

    pub fn never() -> Self {
        Self {
            succeed_on: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReadinessProbe for FlakyProbe {
    async fn probe(&self, node: &ClusterNode) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        match self.succeed_on {
            Some(n) if call >= n => Ok(()),
            _ => Err(EnvError::Runtime(format!("{} refused connection", node.name()))),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryReplicaSetAdmin
// ---------------------------------------------------------------------------

/// Replica-set admin holding the applied membership in memory.
#[derive(Debug, Default)]
pub struct MemoryReplicaSetAdmin {
    membership: Mutex<Option<MembershipState>>,
    applies: AtomicU32,
}

impl MemoryReplicaSetAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn membership(&self) -> Option<MembershipState> {
        self.membership.lock().unwrap().clone()
    }

    pub fn applies(&self) -> u32 {
        self.applies.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReplicaSetAdmin for MemoryReplicaSetAdmin {
    async fn apply(&self, config: &ReplicaSetConfig) -> Result<MembershipState> {
        config.validate()?;
        let mut membership = self.membership.lock().unwrap();
        if let Some(current) = membership.as_ref() {
            if current.set_id != config.id {
                return Err(EnvError::Runtime(format!(
                    "already initialized as {}, cannot reconfigure to {}",
                    current.set_id, config.id
                )));
            }
        }
        let next = config.expected_membership();
        *membership = Some(next.clone());
        self.applies.fetch_add(1, Ordering::Relaxed);
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// One recorded test invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: TestCommand,
    pub env: Vec<(String, String)>,
}

/// Command runner returning a fixed exit code and recording invocations.
#[derive(Debug)]
pub struct ScriptedRunner {
    exit_code: i32,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn exiting_with(exit_code: i32) -> Self {
        Self {
            exit_code,
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &TestCommand, env: &[(String, String)]) -> Result<RunResult> {
        self.invocations.lock().unwrap().push(Invocation {
            command: command.clone(),
            env: env.to_vec(),
        });
        let now = Utc::now();
        Ok(RunResult {
            exit_code: self.exit_code,
            duration_ms: 0,
            started_at: now,
            finished_at: now,
        })
    }
}
