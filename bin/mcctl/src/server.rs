//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "binary"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Instance lifecycle and console subcommands."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use anyhow::Result;
use clap::Args;
use mcctl_orchestrator::{
    BatchOutcome, DeleteRequest, NewInstance, PromptAdapter, StopReport, StopRequest,
};
use mcctl_persistence::{BackendKind, ConsoleEndpoint};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::context::AppContext;
use crate::exit::{worst_class, CliError};

#[derive(Debug, Args)]
pub struct NameArg {
    /// Instance name.
    pub name: String,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// Unique instance name (letters, digits, '_' and '-').
    pub name: String,

    /// Backend driving the instance; asked interactively when omitted.
    #[arg(long, value_name = "KIND")]
    pub backend: Option<BackendKind>,

    /// Runtime configuration reference (compose file, profile, ...). Defaults to the name.
    #[arg(long = "config-ref", value_name = "REF")]
    pub config_ref: Option<String>,

    /// Dedicated console host for this instance.
    #[arg(long = "console-host", value_name = "HOST")]
    pub console_host: Option<String>,

    /// Dedicated console port for this instance.
    #[arg(long = "console-port", value_name = "PORT")]
    pub console_port: Option<u16>,

    /// Console password stored with the endpoint. Needs --console-port.
    #[arg(long = "console-password", env = "MCCTL_CONSOLE_PASSWORD", hide_env_values = true)]
    pub console_password: Option<String>,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    pub name: String,

    /// Stop a running instance before deleting it.
    #[arg(long)]
    pub force: bool,

    /// Delete the instance's world saves too.
    #[arg(long = "cascade-worlds")]
    pub cascade_worlds: bool,
}

#[derive(Debug, Args)]
pub struct StopArgs {
    pub name: String,

    /// Kill immediately instead of waiting for a graceful exit.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct StopAllArgs {
    /// Kill every instance immediately.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct ConsoleArgs {
    pub name: String,

    /// Command and arguments sent verbatim.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

const BACKENDS: [BackendKind; 2] = [BackendKind::ShellManaged, BackendKind::SupervisorManaged];

pub fn create(ctx: &AppContext, args: CreateArgs) -> Result<()> {
    let backend = match args.backend {
        Some(backend) => backend,
        None => choose_backend(ctx)?,
    };
    let console = console_endpoint(
        ctx,
        args.console_host,
        args.console_port,
        args.console_password,
    )?;
    let instance = ctx.orchestrator()?.create_instance(NewInstance {
        config_ref: args.config_ref.unwrap_or_else(|| args.name.clone()),
        name: args.name,
        backend,
        console,
    })?;
    ctx.options.emit(&instance, || {
        format!("Created instance '{}' ({})", instance.name, instance.backend)
    })
}

/// Dedicated console endpoint from the CLI flags. A host or password without a port is refused.
pub fn console_endpoint(
    ctx: &AppContext,
    host: Option<String>,
    port: Option<u16>,
    password: Option<String>,
) -> Result<Option<ConsoleEndpoint>> {
    match (host, port) {
        (host, Some(port)) => Ok(Some(ConsoleEndpoint {
            host: host.unwrap_or_else(|| ctx.config.console.default_host.clone()),
            port,
            password,
        })),
        (Some(_), None) => {
            Err(CliError::Rejected("--console-host needs --console-port".into()).into())
        }
        (None, None) if password.is_some() => {
            Err(CliError::Rejected("--console-password needs --console-port".into()).into())
        }
        (None, None) => Ok(None),
    }
}

fn choose_backend(ctx: &AppContext) -> Result<BackendKind> {
    let options: Vec<String> = BACKENDS.iter().map(ToString::to_string).collect();
    match ctx.prompt().select("Backend for the new instance", &options) {
        Ok(choice) => Ok(choice.parse()?),
        Err(err) => {
            debug!(error = %err, "backend not chosen interactively, using shell-managed");
            Ok(BackendKind::ShellManaged)
        }
    }
}

pub fn delete(ctx: &AppContext, args: DeleteArgs) -> Result<()> {
    let mut question = format!("Delete instance '{}'", args.name);
    if args.cascade_worlds {
        question.push_str(" and its world saves");
    }
    question.push('?');
    let confirmed = ctx.confirm(&question)?;
    let orchestrator = ctx.orchestrator()?;
    let report = ctx.block_on(orchestrator.delete_instance(
        &args.name,
        DeleteRequest {
            confirmed,
            force: args.force,
            cascade_worlds: args.cascade_worlds,
        },
    ))?;
    ctx.options.emit(&report, || {
        let mut lines = vec![format!("Deleted instance '{}'", report.instance.name)];
        if let Some(stop) = &report.stop {
            lines.push(format!("  stopped first: {}", describe_stop(stop)));
        }
        if !report.removed_worlds.is_empty() {
            lines.push(format!("  removed worlds: {}", report.removed_worlds.join(", ")));
        }
        if !report.orphaned_worlds.is_empty() {
            lines.push(format!(
                "  warning: worlds left without a parent: {}",
                report.orphaned_worlds.join(", ")
            ));
        }
        lines.join("\n")
    })
}

pub fn start(ctx: &AppContext, args: NameArg) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    let status = ctx.block_on(orchestrator.start_instance(&args.name))?;
    ctx.options.emit(&json!({ "instance": args.name, "status": status }), || {
        format!("{}: {status}", args.name)
    })
}

pub fn stop(ctx: &AppContext, args: StopArgs) -> Result<()> {
    let request = if args.force {
        let question = format!("Kill instance '{}' without a graceful shutdown?", args.name);
        let confirmed = ctx.confirm(&question)?;
        StopRequest {
            graceful: false,
            confirmed,
            cancel: None,
        }
    } else {
        StopRequest::graceful()
    };
    let orchestrator = ctx.orchestrator()?;
    let report = ctx.block_on(async {
        let request = request.with_cancel(interrupt_flag());
        orchestrator.stop_instance(&args.name, request).await
    })?;
    ctx.options.emit(&json!({ "instance": args.name, "report": report }), || {
        format!("{}: {}", args.name, describe_stop(&report))
    })
}

pub fn restart(ctx: &AppContext, args: NameArg) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    let status = ctx.block_on(orchestrator.restart_instance(&args.name))?;
    ctx.options.emit(&json!({ "instance": args.name, "status": status }), || {
        format!("{}: {status}", args.name)
    })
}

pub fn status(ctx: &AppContext, args: NameArg) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    let status = ctx.block_on(orchestrator.instance_status(&args.name))?;
    ctx.options.emit(&json!({ "instance": args.name, "status": status }), || {
        status.to_string()
    })
}

pub fn list(ctx: &AppContext) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    let overview = ctx.block_on(orchestrator.list_instances())?;
    ctx.options.emit(&overview, || {
        if overview.is_empty() {
            return "No instances registered.".to_owned();
        }
        let mut lines = vec![format!("{:<24} {:<20} {:<10}", "NAME", "BACKEND", "STATUS")];
        for entry in &overview {
            lines.push(format!(
                "{:<24} {:<20} {:<10}",
                entry.instance.name,
                entry.instance.backend.to_string(),
                entry.status.to_string()
            ));
        }
        lines.join("\n")
    })
}

pub fn start_all(ctx: &AppContext) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    let outcomes = ctx.block_on(orchestrator.start_all())?;
    report_batch(ctx, outcomes, |status| status.to_string())
}

pub fn stop_all(ctx: &AppContext, args: StopAllArgs) -> Result<()> {
    let request = if args.force {
        StopRequest {
            graceful: false,
            confirmed: ctx.confirm("Kill every instance without a graceful shutdown?")?,
            cancel: None,
        }
    } else {
        StopRequest::graceful()
    };
    let orchestrator = ctx.orchestrator()?;
    let outcomes = ctx.block_on(async {
        let request = request.with_cancel(interrupt_flag());
        orchestrator.stop_all(request).await
    })?;
    report_batch(ctx, outcomes, describe_stop)
}

pub fn console(ctx: &AppContext, args: ConsoleArgs) -> Result<()> {
    let command = args.command.join(" ");
    let orchestrator = ctx.orchestrator()?;
    let result = ctx.block_on(orchestrator.console_command(&args.name, &command))?;
    ctx.options.emit(&result, || result.stdout.trim_end().to_owned())
}

fn report_batch<T: serde::Serialize>(
    ctx: &AppContext,
    outcomes: Vec<BatchOutcome<T>>,
    render: impl Fn(&T) -> String,
) -> Result<()> {
    let failures: Vec<_> = outcomes
        .iter()
        .filter_map(|outcome| outcome.outcome.as_ref().err())
        .map(|err| err.class())
        .collect();
    let rows: Vec<_> = outcomes
        .iter()
        .map(|outcome| match &outcome.outcome {
            Ok(value) => json!({ "instance": outcome.instance, "ok": value }),
            Err(err) => json!({ "instance": outcome.instance, "error": err.to_string() }),
        })
        .collect();
    ctx.options.emit(&rows, || {
        outcomes
            .iter()
            .map(|outcome| match &outcome.outcome {
                Ok(value) => format!("{}: {}", outcome.instance, render(value)),
                Err(err) => format!("{}: failed: {err}", outcome.instance),
            })
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    match worst_class(failures.iter().copied()) {
        Some(worst) => Err(CliError::BatchFailed {
            failed: failures.len(),
            total: outcomes.len(),
            worst,
        }
        .into()),
        None => Ok(()),
    }
}

fn describe_stop(report: &StopReport) -> String {
    let mut text = format!("{} after {} ms", report.final_status, report.waited.as_millis());
    if report.escalated {
        text.push_str(", killed");
    }
    if report.cancelled {
        text.push_str(" (grace period interrupted)");
    }
    text
}

/// Flag flipped by Ctrl+C; cuts a graceful stop short. Needs a running runtime.
fn interrupt_flag() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, escalating to kill");
            let _ = tx.send(true);
        }
    });
    rx
}
