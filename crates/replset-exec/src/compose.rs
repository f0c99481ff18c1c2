//! docker compose container runtime.
//!
//! Every call shells out to `<docker> compose -f <file> [-p <project>] ...`.
//! Non-zero exits become [`EnvError::Runtime`] carrying the captured stderr.

use async_trait::async_trait;
use replset_core::{ContainerRuntime, EnvConfig, EnvError, NodeSpec, Result};
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

/// Container runtime backed by a compose project.
#[derive(Debug, Clone)]
pub struct ComposeRuntime {
    docker: Vec<String>,
    compose_file: PathBuf,
    project: Option<String>,
    setup_service: Option<String>,
}

impl ComposeRuntime {
    pub fn new(compose_file: PathBuf) -> Self {
        Self {
            docker: vec!["docker".to_string()],
            compose_file,
            project: None,
            setup_service: None,
        }
    }

    pub fn from_config(config: &EnvConfig) -> Self {
        Self {
            docker: config.docker_command.clone(),
            compose_file: config.compose_file.clone(),
            project: config.project.clone(),
            setup_service: config.setup_service.clone(),
        }
    }

    /// Replace the docker launcher (e.g. `["podman"]`, `["sh", "fake-docker.sh"]`).
    pub fn with_docker_command(mut self, docker: Vec<String>) -> Self {
        self.docker = docker;
        self
    }

    pub fn with_project(mut self, project: &str) -> Self {
        self.project = Some(project.to_string());
        self
    }

    pub fn with_setup_service(mut self, setup_service: &str) -> Self {
        self.setup_service = Some(setup_service.to_string());
        self
    }

    pub fn setup_service(&self) -> Option<&str> {
        self.setup_service.as_deref()
    }

    /// Name given to the one-off setup container so teardown can find it.
    pub fn setup_container_name(&self) -> Option<String> {
        let project = self.project.as_deref().unwrap_or("replset-env");
        self.setup_service
            .as_deref()
            .map(|service| format!("{project}-{service}-init"))
    }

    /// Bare docker command (`docker <args>`), outside compose.
    pub fn docker_command(&self, args: &[&str]) -> Command {
        let (program, prefix): (&str, &[String]) = match self.docker.split_first() {
            Some((program, prefix)) => (program.as_str(), prefix),
            None => ("docker", &[]),
        };
        let mut cmd = Command::new(program);
        cmd.args(prefix).args(args);
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }

    /// `docker compose -f <file> [-p <project>] <args>`.
    pub fn compose_command(&self, args: &[&str]) -> Command {
        let mut cmd = self.docker_command(&["compose", "-f"]);
        cmd.arg(&self.compose_file);
        if let Some(project) = &self.project {
            cmd.args(["-p", project.as_str()]);
        }
        cmd.args(args);
        cmd
    }

    /// Force-remove the setup container; a missing container is fine.
    pub async fn remove_setup_container(&self) -> Result<()> {
        let Some(name) = self.setup_container_name() else {
            return Ok(());
        };
        match output_checked(self.docker_command(&["rm", "-f", &name]), "docker rm").await {
            Ok(_) => Ok(()),
            Err(EnvError::Runtime(msg)) if msg.contains("No such container") => {
                debug!(container = %name, "setup container already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ContainerRuntime for ComposeRuntime {
    async fn start_node(&self, node: &NodeSpec) -> Result<()> {
        let cmd = self.compose_command(&["up", "-d", "--no-deps", &node.service]);
        output_checked(cmd, "docker compose up").await?;
        Ok(())
    }

    async fn stop_node(&self, node: &NodeSpec) -> Result<()> {
        let cmd = self.compose_command(&["rm", "--stop", "--force", "-v", &node.service]);
        output_checked(cmd, "docker compose rm").await?;
        Ok(())
    }

    async fn remove_setup(&self) -> Result<()> {
        self.remove_setup_container().await
    }

    async fn running(&self) -> Result<Vec<String>> {
        let cmd = self.compose_command(&["ps", "--services", "--filter", "status=running"]);
        let output = output_checked(cmd, "docker compose ps").await?;
        let mut running = non_empty_lines(&output.stdout);

        if let (Some(name), Some(service)) = (self.setup_container_name(), &self.setup_service) {
            let filter = format!("name=^{name}$");
            let cmd = self.docker_command(&["ps", "--filter", &filter, "--format", "{{.Names}}"]);
            let output = output_checked(cmd, "docker ps").await?;
            if !non_empty_lines(&output.stdout).is_empty() {
                running.push(service.clone());
            }
        }
        Ok(running)
    }
}

/// Run `cmd` to completion, capturing output; non-zero exit is an error.
pub(crate) async fn output_checked(mut cmd: Command, what: &str) -> Result<Output> {
    debug!(command = %what, "running");
    let output = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| EnvError::Runtime(format!("failed to run {what}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(EnvError::Runtime(format!(
            "{what} exited with {}: {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }
    Ok(output)
}

pub(crate) fn non_empty_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
