//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "binary"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Administrator credential subcommands."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{Args, Subcommand};
use mcctl_orchestrator::PromptAdapter;
use mcctl_security::{AuditAction, AuditRecord, CredentialError};
use tracing::warn;
use zeroize::Zeroizing;

use crate::context::AppContext;
use crate::exit::CliError;

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// Register a new administrator.
    Register(PasswordArgs),
    /// Replace an administrator's password.
    Rotate(PasswordArgs),
    /// Check a password; exits non-zero when it does not match.
    Verify(PasswordArgs),
    /// List administrators.
    List,
}

#[derive(Debug, Args)]
pub struct PasswordArgs {
    username: String,

    /// Password; prompted for without echo when omitted.
    #[arg(long, env = "MCCTL_ADMIN_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

pub fn run(ctx: &AppContext, command: AdminCommand) -> Result<()> {
    let store = ctx.credentials();
    match command {
        AdminCommand::Register(args) => {
            let password = new_password(ctx, &args)?;
            let result = store.register(&args.username, &password);
            audit(ctx, AuditAction::AdminRegister, &args.username, &result);
            let credential = result?;
            ctx.options.emit(&credential, || {
                format!("Registered administrator '{}'", credential.username)
            })
        }
        AdminCommand::Rotate(args) => {
            let password = new_password(ctx, &args)?;
            let result = store.rotate(&args.username, &password);
            audit(ctx, AuditAction::AdminRotate, &args.username, &result);
            let credential = result?;
            ctx.options.emit(&credential, || {
                format!("Rotated password for '{}'", credential.username)
            })
        }
        AdminCommand::Verify(args) => {
            let password = password(ctx, &args)?;
            let valid = store.verify(&args.username, &password)?;
            let verdict = serde_json::json!({ "username": args.username, "valid": valid });
            ctx.options.emit(&verdict, || {
                if valid { "valid" } else { "invalid" }.to_owned()
            })?;
            if !valid {
                let message = format!("credentials for '{}' rejected", args.username);
                return Err(CliError::Rejected(message).into());
            }
            Ok(())
        }
        AdminCommand::List => {
            let credentials = store.list()?;
            ctx.options.emit(&credentials, || {
                credentials
                    .iter()
                    .map(|credential| {
                        let last_used = credential
                            .last_used
                            .map(|at| at.to_rfc3339())
                            .unwrap_or_else(|| "never".to_owned());
                        format!(
                            "{:<24} created {}  last used {last_used}",
                            credential.username,
                            credential.created_at.to_rfc3339()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}

fn password(ctx: &AppContext, args: &PasswordArgs) -> Result<Zeroizing<String>> {
    match &args.password {
        Some(password) => Ok(Zeroizing::new(password.clone())),
        None => Ok(Zeroizing::new(ctx.prompt().password(&question(args))?)),
    }
}

/// Like [`password`], but a prompted password must be typed twice.
fn new_password(ctx: &AppContext, args: &PasswordArgs) -> Result<Zeroizing<String>> {
    match &args.password {
        Some(password) => Ok(Zeroizing::new(password.clone())),
        None => Ok(Zeroizing::new(ctx.prompt().new_password(&question(args))?)),
    }
}

fn question(args: &PasswordArgs) -> String {
    format!("Password for '{}'", args.username)
}

fn audit<T>(
    ctx: &AppContext,
    action: AuditAction,
    username: &str,
    result: &Result<T, CredentialError>,
) {
    let actor = ctx.config.audit.actor.clone();
    let record = match result {
        Ok(_) => AuditRecord::success(actor, action, "admin", username),
        Err(err) => AuditRecord::failure(actor, action, "admin", username, err.to_string()),
    };
    if let Err(err) = ctx.audit().record(record) {
        warn!(error = %err, "audit write failed");
    }
}
