//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "binary"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "World save subcommands."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Subcommand};
use mcctl_orchestrator::NewWorld;
use tracing::warn;
use walkdir::WalkDir;

use crate::context::AppContext;
use crate::exit::CliError;

#[derive(Debug, Subcommand)]
pub enum WorldCommand {
    /// List world saves, flagging those whose instance is gone.
    List(ListArgs),
    /// Register a world save under an instance.
    Create(CreateArgs),
    /// Move a world save to another instance, which then holds its lock.
    Assign(AssignArgs),
    /// Drop the lock an instance holds on a world save.
    Release(ReleaseArgs),
    /// Remove a world save record.
    Delete(DeleteArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only worlds of this instance.
    #[arg(long)]
    instance: Option<String>,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    id: String,

    /// Parent instance.
    #[arg(long)]
    instance: String,

    /// Directory holding the world data.
    #[arg(long, value_name = "DIR")]
    location: PathBuf,

    /// Size in bytes; measured from the location when omitted.
    #[arg(long = "size-bytes", value_name = "BYTES")]
    size_bytes: Option<u64>,
}

#[derive(Debug, Args)]
pub struct AssignArgs {
    id: String,
    /// New parent instance.
    instance: String,
}

#[derive(Debug, Args)]
pub struct ReleaseArgs {
    id: String,

    /// Release even while the holding instance is still running.
    #[arg(long)]
    force: bool,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    id: String,
}

pub fn run(ctx: &AppContext, command: WorldCommand) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    match command {
        WorldCommand::List(args) => {
            let views = orchestrator.list_worlds(args.instance.as_deref())?;
            ctx.options.emit(&views, || {
                if views.is_empty() {
                    return "No world saves registered.".to_owned();
                }
                views
                    .iter()
                    .map(|view| {
                        let mut line = format!(
                            "{:<24} {:<24} {:>12}  {}",
                            view.world.id,
                            view.world.instance,
                            view.world.size_bytes,
                            view.world.location.display()
                        );
                        if let Some(holder) = &view.world.locked_by {
                            line.push_str(&format!("  [locked by {holder}]"));
                        }
                        if view.dangling {
                            line.push_str("  [warning: instance missing]");
                        }
                        line
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        WorldCommand::Create(args) => {
            let size_bytes = match args.size_bytes {
                Some(size) => size,
                None => measure(&args.location),
            };
            let world = orchestrator.create_world(NewWorld {
                id: args.id,
                instance: args.instance,
                location: args.location,
                size_bytes,
            })?;
            ctx.options.emit(&world, || {
                format!("Registered world '{}' under '{}'", world.id, world.instance)
            })
        }
        WorldCommand::Assign(args) => {
            let world = orchestrator.assign_world(&args.id, &args.instance)?;
            ctx.options.emit(&world, || {
                format!("World '{}' now belongs to '{}'", world.id, world.instance)
            })
        }
        WorldCommand::Release(args) => {
            if args.force {
                let question =
                    format!("Release world '{}' while its holder may be running?", args.id);
                if !ctx.confirm(&question)? {
                    return Err(CliError::Rejected("release not confirmed".into()).into());
                }
            }
            let world = ctx.block_on(orchestrator.release_world(&args.id, args.force))?;
            ctx.options.emit(&world, || format!("Released world '{}'", world.id))
        }
        WorldCommand::Delete(args) => {
            let confirmed = ctx.confirm(&format!("Delete world save '{}'?", args.id))?;
            let world = orchestrator.delete_world(&args.id, confirmed)?;
            ctx.options.emit(&world, || format!("Deleted world '{}'", world.id))
        }
    }
}

/// Total size of regular files under `location`; 0 when it cannot be read.
fn measure(location: &Path) -> u64 {
    if !location.exists() {
        return 0;
    }
    WalkDir::new(location)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(error = %err, "skipping unreadable world entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}
