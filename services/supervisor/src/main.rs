//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Entry point of the process supervisor daemon."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! mcctl supervisor
//!
//! Hosts supervisor-managed server processes and serves the control API the
//! CLI talks to. Children are halted when the daemon shuts down.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mcctl_common::{init_tracing, LoggingConfig};
use mcctl_supervisor::{load_config, router, validate_config, ProcessTable};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "mcctl-supervisor", about = "Process supervisor for mcctl server instances")]
struct Cli {
    #[arg(long, env = "MCCTL_SUPERVISOR_CONFIG", default_value = "configs/supervisor.toml")]
    config: PathBuf,

    #[arg(long, env = "MCCTL_SUPERVISOR_BIND", default_value = "0.0.0.0:7100")]
    bind: SocketAddr,

    #[arg(long, env = "MCCTL_SUPERVISOR_LOG_DIR", default_value = "logs/supervisor")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the supervisor (default)
    Serve,
    /// Validate the program table and exit
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file = load_config(&cli.config)?;
    let report = validate_config(&file)?;

    if matches!(cli.command, Some(Command::Validate)) {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let logging = LoggingConfig {
        directory: cli.log_dir.clone(),
        ..LoggingConfig::default()
    };
    init_tracing("supervisor", &logging)?;

    let table = Arc::new(ProcessTable::new(file.programs.clone(), file.grace_period()));
    for (name, result) in table.autostart() {
        if let Err(err) = result {
            warn!(process = %name, error = %err, "autostart failed");
        }
    }

    info!(addr = %cli.bind, programs = report.programs, "starting supervisor");
    let listener = TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;

    axum::serve(listener, router(table.clone()).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("halting supervised processes");
    table.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        tokio::select! {
            _ = ctrl_c() => {},
            _ = terminate() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
    }
}

async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to install Ctrl+C handler");
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(err) => warn!(?err, "failed to install SIGTERM handler"),
    }
}
