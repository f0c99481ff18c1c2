//! replset-env - MongoDB replica set around a test run
//!
//! The `replset-env` command brings a containerised replica set up, runs the
//! test command against it and tears it down again.
//!
//! ## Commands
//!
//! - `up`: start the nodes, wait for readiness, apply the replica-set config
//! - `run`: `up`, run the test command, tear down (cluster kept on failure)
//! - `down`: remove the setup container and the cluster
//! - `uri`: print the connection string the tests receive
//! - `status`: list running services of the compose project

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use replset_core::{write_report_json, EnvConfig, EnvError, LifecycleState, TestCommand};
use replset_exec::{compose_orchestrator, ProbeKind};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, Level};

#[derive(Parser, Debug)]
#[command(name = "replset-env")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run tests against a throwaway MongoDB replica set", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: replset-env.toml in the current directory)
    #[arg(short, long, global = true, env = "REPLSET_ENV_CONFIG")]
    config: Option<PathBuf>,

    /// Compose file, overrides the config value
    #[arg(short = 'f', long, global = true, env = "REPLSET_ENV_COMPOSE_FILE")]
    compose_file: Option<PathBuf>,

    /// Readiness check used while waiting for nodes
    #[arg(long, global = true, value_enum, default_value_t = ProbeArg::Mongosh)]
    probe: ProbeArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the cluster, wait until ready and apply the replica-set config
    Up,

    /// Bring the cluster up, run a test command, then tear down
    ///
    /// The cluster is removed when the command exits 0 and left running
    /// otherwise so it can be inspected.
    Run {
        /// Write a JSON run report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Kill the test command after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Test command and its arguments, after `--`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Remove the setup container and every cluster node
    Down,

    /// Print the connection string passed to tests
    Uri,

    /// List running services of the compose project
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ProbeArg {
    Tcp,
    Mongosh,
}

impl From<ProbeArg> for ProbeKind {
    fn from(arg: ProbeArg) -> Self {
        match arg {
            ProbeArg::Tcp => ProbeKind::Tcp,
            ProbeArg::Mongosh => ProbeKind::Mongosh,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    replset_core::init_tracing(cli.json, level);

    match execute(cli).await {
        Ok(code) => ExitCode::from(exit_status(code)),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_status(exit_code_for(&err)))
        }
    }
}

async fn execute(cli: Cli) -> Result<i32> {
    let config = load_config(cli.config.as_deref(), cli.compose_file)?;
    let probe = ProbeKind::from(cli.probe);

    match cli.command {
        Commands::Up => cmd_up(config, probe).await.map(|()| 0),
        Commands::Run {
            report,
            timeout,
            command,
        } => cmd_run(config, probe, command, timeout, report.as_deref()).await,
        Commands::Down => cmd_down(config, probe).await.map(|()| 0),
        Commands::Uri => cmd_uri(&config).map(|()| 0),
        Commands::Status => cmd_status(config, probe).await.map(|()| 0),
    }
}

/// Config file (explicit or discovered) with CLI overrides applied.
fn load_config(path: Option<&Path>, compose_file: Option<PathBuf>) -> Result<EnvConfig> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let mut config = EnvConfig::discover(path, &cwd).context("Failed to load configuration")?;
    if let Some(compose_file) = compose_file {
        config.compose_file = compose_file;
    }
    config.validate().context("Invalid configuration")?;
    debug!(compose_file = %config.compose_file.display(), nodes = config.nodes.len(), "configuration loaded");
    Ok(config)
}

async fn cmd_up(config: EnvConfig, probe: ProbeKind) -> Result<()> {
    let mut orchestrator = compose_orchestrator(config, probe)?;
    let uri = orchestrator
        .up()
        .await
        .context("Failed to bring the replica set up")?;
    println!("{uri}");
    Ok(())
}

async fn cmd_run(
    config: EnvConfig,
    probe: ProbeKind,
    argv: Vec<String>,
    timeout: Option<u64>,
    report_path: Option<&Path>,
) -> Result<i32> {
    let timeout_secs = timeout.unwrap_or(config.test_timeout_secs);
    let command = TestCommand::new(argv).with_timeout(timeout_secs);

    let mut orchestrator = compose_orchestrator(config, probe)?;
    let report = orchestrator.run(&command).await?;

    if let Some(path) = report_path {
        write_report_json(path, &report)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    println!();
    println!("Run ID: {}", report.run_id);
    println!("Command: {}", command.display());
    println!(
        "Status: {}",
        if report.passed() { "✓ PASSED" } else { "✗ FAILED" }
    );
    println!("Exit code: {}", report.exit_code);
    println!("Duration: {}ms", report.test_duration_ms);
    if let Some(err) = &report.teardown_error {
        println!("✗ Teardown incomplete: {}", err);
    }
    if report.final_state == LifecycleState::LeftRunning {
        println!("Cluster left running for inspection:");
        for service in &report.remaining {
            println!("  - {}", service);
        }
        println!("Run `replset-env down` to remove it.");
    }

    Ok(report.exit_code)
}

async fn cmd_down(config: EnvConfig, probe: ProbeKind) -> Result<()> {
    let mut orchestrator = compose_orchestrator(config, probe)?;
    orchestrator
        .down()
        .await
        .context("Failed to tear the replica set down")?;
    println!("✓ Replica set removed");
    Ok(())
}

fn cmd_uri(config: &EnvConfig) -> Result<()> {
    println!("{}", config.connection_string()?);
    Ok(())
}

async fn cmd_status(config: EnvConfig, probe: ProbeKind) -> Result<()> {
    let orchestrator = compose_orchestrator(config, probe)?;
    let running = orchestrator
        .remaining()
        .await
        .context("Failed to query running services")?;

    if running.is_empty() {
        println!("No services running.");
        return Ok(());
    }
    println!("Running services:");
    for service in &running {
        println!("  {}", service);
    }
    Ok(())
}

/// Process exit code for an error: the domain mapping when one is in the
/// chain, `1` otherwise.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<EnvError>()
        .map_or(1, EnvError::exit_code)
}

/// Codes outside `0..=255` (signals, `-1`) collapse to `1`.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_takes_trailing_command() {
        let cli = Cli::try_parse_from([
            "replset-env",
            "--probe",
            "tcp",
            "run",
            "--report",
            "report.json",
            "--",
            "npm",
            "test",
            "--runInBand",
        ])
        .unwrap();

        assert_eq!(cli.probe, ProbeArg::Tcp);
        match cli.command {
            Commands::Run {
                report, command, ..
            } => {
                assert_eq!(report, Some(PathBuf::from("report.json")));
                assert_eq!(command, vec!["npm", "test", "--runInBand"]);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["replset-env", "run"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["replset-env", "up", "-v", "-f", "ci/compose.yml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.compose_file, Some(PathBuf::from("ci/compose.yml")));
        assert!(matches!(cli.command, Commands::Up));
    }

    #[test]
    fn test_load_config_applies_compose_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replset-env.toml");
        std::fs::write(
            &path,
            r#"
                compose_file = "from-file.yml"
                uri_env_var = "DATABASE_URL"
            "#,
        )
        .unwrap();

        let config = load_config(Some(&path), Some(PathBuf::from("override.yml"))).unwrap();
        assert_eq!(config.compose_file, PathBuf::from("override.yml"));
        assert_eq!(config.uri_env_var, "DATABASE_URL");
    }

    #[test]
    fn test_load_config_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.toml")), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EnvError>(),
            Some(EnvError::Io(_))
        ));
    }

    #[test]
    fn test_exit_code_for_errors() {
        let timeout = anyhow::Error::from(EnvError::StartupTimeout {
            node: "mongo1".to_string(),
            attempts: 10,
            waited_ms: 9000,
        })
        .context("Failed to bring the replica set up");
        assert_eq!(exit_code_for(&timeout), replset_core::TIMEOUT_EXIT_CODE);

        let failed = anyhow::Error::from(EnvError::TestCommandFailed { exit_code: 3 });
        assert_eq!(exit_code_for(&failed), 3);

        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn test_exit_code_out_of_range() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(124), 124);
        assert_eq!(exit_status(-1), 1);
        assert_eq!(exit_status(300), 1);
    }
}
