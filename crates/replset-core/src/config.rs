//! Environment configuration, loaded from an optional `replset-env.toml`.
//!
//! Every field has a default describing the common single-node setup: one
//! `mongo1` service published on `localhost:27017` and advertised to the set
//! as `mongo1:27017`, replica set `rs0`, a one-shot `mongo-setup` service, and
//! `MONGODB_URI` for the test process.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::connection::{ConnectionString, ReadPreference};
use crate::error::{EnvError, Result};
use crate::node::{preferred_primary, NodeSpec};
use crate::probe::ProbePolicy;
use crate::replset::{ReplicaSetConfig, DEFAULT_SET_ID};

/// Default config file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "replset-env.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnvConfig {
    /// Container CLI launcher, e.g. `["docker"]` or `["sudo", "docker"]`.
    pub docker_command: Vec<String>,

    /// Compose file describing the cluster.
    pub compose_file: PathBuf,

    /// Compose project name; compose derives one from the directory if unset.
    pub project: Option<String>,

    /// One-shot service that ran the init script, removed on teardown.
    pub setup_service: Option<String>,

    /// Replica-set name.
    pub set_id: String,

    pub nodes: Vec<NodeSpec>,

    pub probe: ProbePolicy,

    /// Environment variable carrying the connection string.
    pub uri_env_var: String,

    pub database: Option<String>,
    pub read_preference: ReadPreference,
    pub direct_connection: bool,

    /// Limit for the test command in seconds; `0` disables it.
    pub test_timeout_secs: u64,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            docker_command: vec!["docker".to_string()],
            compose_file: PathBuf::from("docker-compose.yml"),
            project: None,
            setup_service: Some("mongo-setup".to_string()),
            set_id: DEFAULT_SET_ID.to_string(),
            nodes: vec![NodeSpec::new("mongo1", "localhost", 27017).with_member_host("mongo1:27017")],
            probe: ProbePolicy::default(),
            uri_env_var: "MONGODB_URI".to_string(),
            database: None,
            read_preference: ReadPreference::Primary,
            direct_connection: true,
            test_timeout_secs: 0,
        }
    }
}

impl EnvConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EnvConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `path` when given, else `replset-env.toml` in `dir` when present,
    /// else defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            return Self::load(&candidate);
        }
        debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.docker_command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(EnvError::InvalidConfig("docker_command is empty".to_string()));
        }
        if self.nodes.is_empty() {
            return Err(EnvError::InvalidConfig("at least one node is required".to_string()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if node.name.trim().is_empty() || node.service.trim().is_empty() {
                return Err(EnvError::InvalidConfig(format!(
                    "node #{} needs a name and a service",
                    i + 1
                )));
            }
            if self.nodes[..i].iter().any(|n| n.name == node.name) {
                return Err(EnvError::InvalidConfig(format!(
                    "duplicate node name {}",
                    node.name
                )));
            }
        }
        if self.probe.interval_ms == 0 {
            return Err(EnvError::InvalidConfig(
                "probe interval must be positive".to_string(),
            ));
        }
        if self.uri_env_var.trim().is_empty() {
            return Err(EnvError::InvalidConfig("uri_env_var is empty".to_string()));
        }
        self.replica_set_config().map(|_| ())
    }

    pub fn replica_set_config(&self) -> Result<ReplicaSetConfig> {
        ReplicaSetConfig::from_nodes(&self.set_id, &self.nodes)
    }

    pub fn primary(&self) -> Result<&NodeSpec> {
        preferred_primary(&self.nodes).ok_or_else(|| {
            EnvError::InvalidConfig("no node can become primary".to_string())
        })
    }

    pub fn connection_string(&self) -> Result<ConnectionString> {
        Ok(ConnectionString::for_primary(self.primary()?, &self.set_id)
            .with_database(self.database.clone())
            .with_read_preference(self.read_preference)
            .with_direct_connection(self.direct_connection))
    }
}
