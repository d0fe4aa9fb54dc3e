//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "binary"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Operator CLI for the game-server control plane."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mcctl_logging as logging;

mod admin;
mod audit;
mod config;
mod context;
mod docs;
mod exit;
mod prompt;
mod server;
mod world;

use context::{AppContext, GlobalOptions};

#[derive(Debug, Parser)]
#[command(
    name = "mcctl",
    version,
    about = "Manage game-server instances across compose and supervisor backends",
    long_about = None
)]
struct Cli {
    /// Configuration file (overrides MCCTL_CONFIG and the default search path).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Actor recorded in the audit trail.
    #[arg(long, global = true, env = "MCCTL_ACTOR", value_name = "NAME")]
    actor: Option<String>,

    /// Answer yes to every confirmation.
    #[arg(short = 'y', long, global = true)]
    yes: bool,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Register a new instance.
    Create(server::CreateArgs),
    /// Remove an instance record.
    Delete(server::DeleteArgs),
    /// Start an instance.
    Start(server::NameArg),
    /// Stop an instance.
    Stop(server::StopArgs),
    /// Stop then start an instance.
    Restart(server::NameArg),
    /// Show the live status of one instance.
    Status(server::NameArg),
    /// List instances with their live status.
    List,
    /// Start every instance.
    StartAll,
    /// Stop every instance.
    StopAll(server::StopAllArgs),
    /// Send one command to an instance console.
    Console(server::ConsoleArgs),
    #[command(subcommand, about = "Per-instance configuration and settings")]
    Config(config::ConfigCommand),
    #[command(subcommand, about = "World save management")]
    World(world::WorldCommand),
    #[command(subcommand, about = "Administrator credentials")]
    Admin(admin::AdminCommand),
    #[command(subcommand, about = "Audit trail inspection")]
    Audit(audit::AuditCommand),
    #[command(subcommand, about = "Bundled documentation")]
    Docs(docs::DocsCommand),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit::code_for(&err)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let options = GlobalOptions {
        config: cli.config,
        actor: cli.actor,
        assume_yes: cli.yes,
        json: cli.json,
    };
    match cli.command {
        // docs never open the store
        Commands::Docs(cmd) => {
            logging::init();
            docs::run(cmd, &options)
        }
        command => dispatch(&AppContext::load(options)?, command),
    }
}

fn dispatch(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Create(args) => server::create(ctx, args),
        Commands::Delete(args) => server::delete(ctx, args),
        Commands::Start(args) => server::start(ctx, args),
        Commands::Stop(args) => server::stop(ctx, args),
        Commands::Restart(args) => server::restart(ctx, args),
        Commands::Status(args) => server::status(ctx, args),
        Commands::List => server::list(ctx),
        Commands::StartAll => server::start_all(ctx),
        Commands::StopAll(args) => server::stop_all(ctx, args),
        Commands::Console(args) => server::console(ctx, args),
        Commands::Config(cmd) => config::run(ctx, cmd),
        Commands::World(cmd) => world::run(ctx, cmd),
        Commands::Admin(cmd) => admin::run(ctx, cmd),
        Commands::Audit(cmd) => audit::run(ctx, cmd),
        Commands::Docs(cmd) => docs::run(cmd, &ctx.options),
    }
}
