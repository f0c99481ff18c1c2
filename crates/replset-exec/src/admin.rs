//! Replica-set initiation through mongosh.
//!
//! With a setup service configured, the init script runs in a named one-off
//! container of that service (`compose run`), which stays around until
//! teardown removes it. Without one, the script is `exec`'d inside the
//! preferred primary's own container.

use async_trait::async_trait;
use replset_core::{
    EnvConfig, EnvError, MembershipState, NodeSpec, ReplicaSetAdmin, ReplicaSetConfig, Result,
};
use tracing::{debug, info};

use crate::compose::{non_empty_lines, output_checked, ComposeRuntime};

#[derive(Debug, Clone)]
pub struct MongoshAdmin {
    compose: ComposeRuntime,
    primary: NodeSpec,
}

impl MongoshAdmin {
    pub fn new(compose: ComposeRuntime, primary: NodeSpec) -> Self {
        Self { compose, primary }
    }

    pub fn from_config(compose: ComposeRuntime, config: &EnvConfig) -> Result<Self> {
        Ok(Self::new(compose, config.primary()?.clone()))
    }

    /// Arguments of the compose invocation that runs `script`.
    pub fn script_args(&self, script: &str) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        match (self.compose.setup_service(), self.compose.setup_container_name()) {
            (Some(service), Some(name)) => {
                args.extend(["run", "--no-deps", "-T", "--name"].map(String::from));
                args.push(name);
                args.push(service.to_string());
                args.extend(["mongosh", "--host"].map(String::from));
                args.push(self.primary.member_address());
            }
            _ => {
                args.extend(["exec", "-T"].map(String::from));
                args.push(self.primary.service.clone());
                args.push("mongosh".to_string());
            }
        }
        args.extend(["--quiet", "--eval"].map(String::from));
        args.push(script.to_string());
        args
    }
}

/// Parse the membership JSON line printed at the end of the init script.
pub fn parse_membership(stdout: &[u8]) -> Result<MembershipState> {
    let lines = non_empty_lines(stdout);
    let last = lines.last().ok_or_else(|| {
        EnvError::Runtime("replica-set init printed no membership".to_string())
    })?;
    Ok(serde_json::from_str(last)?)
}

#[async_trait]
impl ReplicaSetAdmin for MongoshAdmin {
    async fn apply(&self, config: &ReplicaSetConfig) -> Result<MembershipState> {
        config.validate()?;
        // a container left by an earlier failed run would clash on --name
        self.compose.remove_setup_container().await?;

        info!(set_id = %config.id, primary = %self.primary.name, "applying replica set config");
        let args = self.script_args(&config.init_script());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = output_checked(
            self.compose.compose_command(&arg_refs),
            "replica set init",
        )
        .await?;

        let membership = parse_membership(&output.stdout)?;
        debug!(?membership, "replica set membership");
        Ok(membership)
    }
}
