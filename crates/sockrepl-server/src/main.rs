//! sockrepl: entry point.
//!
//! Starts the socket REPL servers described by the configuration file and by
//! `-D` bootstrap properties, then runs until Ctrl+C (or until every
//! foreground server has been stopped from inside a session).
//!
//! # Usage
//!
//! ```text
//! sockrepl [OPTIONS]
//!
//! Options:
//!   -c, --config <PATH>      TOML configuration file
//!       --prefix <PREFIX>    Property prefix for `<prefix>.server.<name>` keys
//!   -D, --property <K=V>     Bootstrap property (repeatable)
//! ```
//!
//! Example:
//!
//! ```text
//! sockrepl -D 'sockrepl.server.admin={:port 5555 :accept sockrepl.server/repl}'
//! nc localhost 5555
//! user=> (session)
//! {:server "admin", :client 1}
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable          | Description                                   |
//! |-------------------|-----------------------------------------------|
//! | `SOCKREPL_CONFIG` | Configuration file path                       |
//! | `SOCKREPL_PREFIX` | Property prefix (overrides the config file)   |
//! | `RUST_LOG`        | Log filter (overrides `general.log_level`)    |
//!
//! # Process lifetime
//!
//! - A server started with `server-daemon = false` keeps the process alive:
//!   once all such servers have been stopped, the process exits.
//! - On exit, sessions of servers started with `client-daemon = false` are
//!   waited for; all other sessions are abandoned.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use sockrepl_server::domain::AppConfig;
use sockrepl_server::ServerManager;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// How often the main loop checks for shutdown conditions.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Multi-client socket REPL server.
#[derive(Debug, Parser)]
#[command(
    name = "sockrepl",
    about = "Serve named REPL endpoints over TCP, one session per connection",
    version
)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "SOCKREPL_CONFIG")]
    config: Option<PathBuf>,

    /// Prefix of `<prefix>.server.<name>` bootstrap properties.
    ///
    /// Defaults to the config file's `general.prefix` (itself `sockrepl`).
    #[arg(long, env = "SOCKREPL_PREFIX")]
    prefix: Option<String>,

    /// Bootstrap property as `key=value`; may be given several times.
    #[arg(short = 'D', long = "property", value_parser = parse_property)]
    properties: Vec<(String, String)>,
}

/// Splits `key=value` at the first `=`.
fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{raw}'")),
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and the configuration file (if any) loaded.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over the file's
///    `general.log_level`.
/// 3. Servers declared under `[servers.*]` are started, then one server per
///    matching bootstrap property (file `[properties]` merged with `-D`).
/// 4. The main loop waits for Ctrl+C or for the last foreground server to
///    stop, then stops everything and waits for pinned sessions.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::default(),
    };

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    // ── Start servers ─────────────────────────────────────────────────────────
    let manager = ServerManager::new();

    for options in config.declared_servers() {
        let name = options.name.clone().unwrap_or_default();
        manager
            .start(options)
            .await
            .with_context(|| format!("starting server '{name}' from config"))?;
    }

    // Command-line properties override file properties with the same key.
    let mut properties = config.properties.clone();
    properties.extend(cli.properties);
    let prefix = cli.prefix.unwrap_or(config.general.prefix);
    manager
        .start_all(&properties, &prefix)
        .await
        .context("starting servers from properties")?;

    let names = manager.server_names();
    if names.is_empty() {
        bail!("no servers configured; declare [servers.<name>] or pass -D {prefix}.server.<name>=...");
    }
    info!(servers = ?names, "sockrepl running");

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    // `AtomicBool` inside an `Arc` lets the signal task flip the flag while
    // the main loop reads it, without a lock.
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    // `tokio::signal::ctrl_c` resolves on the first Ctrl+C (SIGINT on Unix,
    // the console handler on Windows).
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    // ── Main loop ─────────────────────────────────────────────────────────────
    // Polls instead of awaiting a single event: either the flag or a session
    // calling `(stop-server)` on the last foreground server ends the loop.
    let had_foreground = manager.has_non_daemon_servers();
    while running.load(Ordering::Relaxed) {
        if had_foreground && !manager.has_non_daemon_servers() {
            info!("all foreground servers stopped");
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    // Stop accepting first.  Connections accepted before this point are
    // already counted as pinned, so the wait below cannot miss one.
    manager.stop_all().await;
    while manager.pinned_sessions() > 0 {
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    info!("sockrepl stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_are_empty() {
        // Arrange: parse with no arguments
        let cli = Cli::parse_from(["sockrepl"]);

        // Assert
        assert!(cli.config.is_none());
        assert!(cli.properties.is_empty());
    }

    #[test]
    fn test_repeated_properties_are_collected_in_order() {
        let cli = Cli::parse_from([
            "sockrepl",
            "-D",
            "sockrepl.server.a={:port 1 :accept x}",
            "--property",
            "other=1=2",
        ]);
        assert_eq!(
            cli.properties,
            vec![
                (
                    "sockrepl.server.a".to_string(),
                    "{:port 1 :accept x}".to_string()
                ),
                ("other".to_string(), "1=2".to_string()),
            ]
        );
    }

    #[test]
    fn test_property_without_equals_is_rejected() {
        assert!(Cli::try_parse_from(["sockrepl", "-D", "novalue"]).is_err());
        assert!(parse_property("=x").is_err());
    }
}
