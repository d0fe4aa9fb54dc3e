//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "binary"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Documentation browsing subcommands."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{Args, Subcommand};
use mcctl_orchestrator::DocsAdapter;

use crate::context::{self, GlobalOptions};

#[derive(Debug, Subcommand)]
pub enum DocsCommand {
    /// List documentation topics.
    List,
    /// Print one topic.
    Show(ShowArgs),
    /// Documented server environment variables.
    Env(EnvArgs),
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    slug: String,
}

#[derive(Debug, Args)]
pub struct EnvArgs {
    /// Only variables of this category (case-insensitive).
    #[arg(long)]
    category: Option<String>,
}

pub fn run(command: DocsCommand, options: &GlobalOptions) -> Result<()> {
    let config = context::load_config(options)?;
    let docs = context::docs(&config);
    match command {
        DocsCommand::List => {
            let topics = docs.list_topics()?;
            options.emit(&topics, || {
                if topics.is_empty() {
                    return format!("No documentation found in {}", config.docs.directory.display());
                }
                topics
                    .iter()
                    .map(|topic| format!("{:<28} {}", topic.slug, topic.title))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        DocsCommand::Show(args) => {
            let content = docs.read(&args.slug)?;
            options.emit(&serde_json::json!({ "slug": args.slug, "content": content }), || {
                content.trim_end().to_owned()
            })
        }
        DocsCommand::Env(args) => {
            let vars = docs.env_vars(args.category.as_deref())?;
            options.emit(&vars, || {
                vars.iter()
                    .map(|var| {
                        format!(
                            "{:<20} {:<8} {:<12} {}{}",
                            var.name,
                            var.kind.to_string(),
                            var.default.as_deref().unwrap_or("-"),
                            var.description,
                            if var.required { " (required)" } else { "" }
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}
