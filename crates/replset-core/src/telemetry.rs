//! Tracing setup for the replset-env binary.
//!
//! `replset-env up` prints the connection string on stdout so callers can
//! capture it (`export MONGODB_URI=$(replset-env up)`), and `run` shares the
//! terminal with the test command's own output. Every log line therefore
//! goes to stderr, and without `RUST_LOG` only this workspace's crates log
//! at the requested level; everything else is held to `warn`.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events are shown at the requested level by default.
const WORKSPACE_TARGETS: &[&str] = &["replset_core", "replset_exec", "replset_env"];

/// Filter used when `RUST_LOG` is unset, e.g.
/// `warn,replset_core=info,replset_exec=info,replset_env=info`.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(WORKSPACE_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Install the global subscriber: `RUST_LOG` wins over `level`, and `json`
/// switches to newline-delimited JSON. Only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok();
    }
}
