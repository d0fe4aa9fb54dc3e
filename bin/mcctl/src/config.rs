//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "binary"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Per-instance configuration view and update subcommands."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{Args, Subcommand};
use indexmap::IndexMap;
use mcctl_persistence::{ConsoleEndpoint, ServerInstance, ServerInstancePatch};
use serde_json::{json, Value};

use crate::context::AppContext;
use crate::exit::CliError;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show an instance's configuration, or the value of one setting.
    Show(ShowArgs),
    /// Change settings, the configuration reference, or the console endpoint.
    Set(SetArgs),
    /// Remove settings.
    Unset(UnsetArgs),
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    name: String,
    /// Print only this setting.
    key: Option<String>,
}

#[derive(Debug, Args)]
pub struct SetArgs {
    name: String,

    /// Settings to store.
    #[arg(value_name = "KEY=VALUE")]
    pairs: Vec<String>,

    /// Replacement runtime configuration reference.
    #[arg(long = "config-ref", value_name = "REF")]
    config_ref: Option<String>,

    /// Console host; keeps the stored host when omitted.
    #[arg(long = "console-host", value_name = "HOST")]
    console_host: Option<String>,

    /// Console port; required when the instance has no console endpoint yet.
    #[arg(long = "console-port", value_name = "PORT")]
    console_port: Option<u16>,

    /// Console password stored with the endpoint.
    #[arg(long = "console-password", value_name = "PASSWORD")]
    console_password: Option<String>,

    /// Drop the dedicated endpoint and fall back to the configured default.
    #[arg(
        long = "clear-console",
        conflicts_with_all = ["console_host", "console_port", "console_password"]
    )]
    clear_console: bool,
}

#[derive(Debug, Args)]
pub struct UnsetArgs {
    name: String,
    #[arg(required = true)]
    keys: Vec<String>,
}

pub fn run(ctx: &AppContext, command: ConfigCommand) -> Result<()> {
    let orchestrator = ctx.orchestrator()?;
    match command {
        ConfigCommand::Show(args) => {
            let instance = orchestrator.get_instance(&args.name)?;
            match args.key {
                Some(key) => {
                    let Some(value) = instance.settings.get(&key) else {
                        let reason = format!("instance '{}' has no setting '{key}'", args.name);
                        return Err(CliError::Rejected(reason).into());
                    };
                    ctx.options
                        .emit(&json!({ "key": key, "value": value }), || value.clone())
                }
                None => ctx.options.emit(&view(&instance), || render(&instance)),
            }
        }
        ConfigCommand::Set(args) => {
            let current = orchestrator.get_instance(&args.name)?;
            let patch = set_patch(ctx, &current, args)?;
            let updated = orchestrator.update_instance(&current.name, patch)?;
            ctx.options.emit(&view(&updated), || {
                format!("Updated instance '{}'\n{}", updated.name, render(&updated))
            })
        }
        ConfigCommand::Unset(args) => {
            let patch = ServerInstancePatch {
                settings: args.keys.into_iter().map(|key| (key, None)).collect(),
                ..ServerInstancePatch::default()
            };
            let updated = orchestrator.update_instance(&args.name, patch)?;
            ctx.options.emit(&view(&updated), || {
                format!("Updated instance '{}'\n{}", updated.name, render(&updated))
            })
        }
    }
}

fn set_patch(
    ctx: &AppContext,
    current: &ServerInstance,
    args: SetArgs,
) -> Result<ServerInstancePatch> {
    let mut settings = IndexMap::new();
    for pair in &args.pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::Rejected(format!("expected KEY=VALUE, got '{pair}'")).into());
        };
        settings.insert(key.to_owned(), Some(value.to_owned()));
    }

    let console = if args.clear_console {
        Some(None)
    } else if args.console_host.is_some()
        || args.console_port.is_some()
        || args.console_password.is_some()
    {
        let stored = current.console.as_ref();
        let Some(port) = args.console_port.or(stored.map(|endpoint| endpoint.port)) else {
            let reason = "instance has no console endpoint yet; pass --console-port";
            return Err(CliError::Rejected(reason.into()).into());
        };
        Some(Some(ConsoleEndpoint {
            host: args
                .console_host
                .or_else(|| stored.map(|endpoint| endpoint.host.clone()))
                .unwrap_or_else(|| ctx.config.console.default_host.clone()),
            port,
            password: args
                .console_password
                .or_else(|| stored.and_then(|endpoint| endpoint.password.clone())),
        }))
    } else {
        None
    };

    let patch = ServerInstancePatch {
        config_ref: args.config_ref,
        console,
        settings,
    };
    if patch.is_empty() {
        return Err(CliError::Rejected("nothing to change".into()).into());
    }
    Ok(patch)
}

/// JSON view of an instance's configuration. The console password is never printed.
fn view(instance: &ServerInstance) -> Value {
    json!({
        "name": instance.name,
        "backend": instance.backend,
        "config_ref": instance.config_ref,
        "console": instance.console.as_ref().map(|endpoint| json!({
            "host": endpoint.host,
            "port": endpoint.port,
            "password_stored": endpoint.password.is_some(),
        })),
        "settings": instance.settings,
    })
}

fn render(instance: &ServerInstance) -> String {
    let console = match &instance.console {
        Some(endpoint) => {
            let mut text = format!("{}:{}", endpoint.host, endpoint.port);
            if endpoint.password.is_some() {
                text.push_str(" (password stored)");
            }
            text
        }
        None => "default".to_owned(),
    };
    let mut lines = vec![
        format!("backend:     {}", instance.backend),
        format!("config-ref:  {}", instance.config_ref),
        format!("console:     {console}"),
    ];
    if instance.settings.is_empty() {
        lines.push("settings:    (none)".to_owned());
    } else {
        lines.push("settings:".to_owned());
        for (key, value) in &instance.settings {
            lines.push(format!("  {key} = {value}"));
        }
    }
    lines.join("\n")
}
