//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "binary"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Audit trail subcommands."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{Args, Subcommand};
use mcctl_security::{AuditAction, AuditFilter, AuditStatus};

use crate::context::AppContext;
use crate::exit::CliError;

#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// Check the hash chain; exits non-zero when it is broken.
    Verify,
    /// Show the newest entries.
    Tail(TailArgs),
}

#[derive(Debug, Args)]
pub struct TailArgs {
    /// Number of entries.
    #[arg(short = 'n', long, default_value_t = 20)]
    limit: usize,

    /// Only this action (e.g. `server.stop`).
    #[arg(long)]
    action: Option<AuditAction>,

    /// Only entries about this target.
    #[arg(long)]
    target: Option<String>,

    /// Only failed operations.
    #[arg(long)]
    failures: bool,
}

pub fn run(ctx: &AppContext, command: AuditCommand) -> Result<()> {
    match command {
        AuditCommand::Verify => {
            let intact = ctx.audit().verify()?;
            ctx.options.emit(&serde_json::json!({ "intact": intact }), || {
                if intact { "audit chain intact" } else { "audit chain BROKEN" }.to_owned()
            })?;
            if !intact {
                return Err(CliError::Rejected("audit log failed verification".to_owned()).into());
            }
            Ok(())
        }
        AuditCommand::Tail(args) => {
            let filter = AuditFilter {
                action: args.action,
                target_name: args.target,
                status: args.failures.then_some(AuditStatus::Failure),
                limit: Some(args.limit),
            };
            let entries = ctx.audit().query(&filter)?;
            ctx.options.emit(&entries, || {
                entries
                    .iter()
                    .map(|entry| {
                        let mut line = format!(
                            "{} {:<16} {:<8} {}:{} by {}",
                            entry.timestamp.to_rfc3339(),
                            entry.action.to_string(),
                            entry.status.to_string(),
                            entry.target_type,
                            entry.target_name,
                            entry.actor
                        );
                        if let Some(error) = &entry.error_message {
                            line.push_str(&format!(" ({error})"));
                        }
                        line
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}
