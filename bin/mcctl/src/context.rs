//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "binary"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Composition root wiring concrete adapters for CLI commands."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use mcctl_common::{init_tracing, AppConfig};
use mcctl_orchestrator::{
    Adapters, ComposeServiceManager, FsDocs, HttpSupervisorClient, Orchestrator,
    OrchestratorConfig, PromptAdapter, PromptError, ServiceManager, SupervisorServiceManager,
};
use mcctl_persistence::Store;
use mcctl_rcon::RconClient;
use mcctl_security::{AuditTrail, CredentialStore};
use mcctl_shell::{ProcessShell, ShellAdapter};
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::prompt::TerminalPrompt;

const CONFIG_CANDIDATES: &[&str] = &["mcctl.toml", "configs/mcctl.toml"];

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub actor: Option<String>,
    pub assume_yes: bool,
    pub json: bool,
}

impl GlobalOptions {
    /// Print `value` as JSON under `--json`, otherwise the rendered text.
    pub fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            let text = text();
            if !text.is_empty() {
                println!("{text}");
            }
        }
        Ok(())
    }
}

/// Resolve configuration: `--config`, then `MCCTL_CONFIG`, then the search path, then defaults.
pub fn load_config(options: &GlobalOptions) -> Result<AppConfig> {
    let mut config = match &options.config {
        Some(path) => AppConfig::from_path(path)?,
        None => {
            let loaded = AppConfig::load_or_default(CONFIG_CANDIDATES)?;
            match &loaded.source {
                Some(path) => debug!(config = %path.display(), "configuration loaded"),
                None => debug!("using built-in configuration defaults"),
            }
            loaded.config
        }
    };
    if let Some(actor) = &options.actor {
        config.audit.actor = actor.clone();
    }
    Ok(config)
}

/// Concrete adapters for one CLI invocation.
pub struct AppContext {
    pub options: GlobalOptions,
    pub config: AppConfig,
    store: Arc<Store>,
    audit: AuditTrail,
    runtime: Runtime,
}

impl AppContext {
    pub fn load(options: GlobalOptions) -> Result<Self> {
        let config = load_config(&options)?;
        init_tracing("mcctl", &config.logging).context("failed to initialise logging")?;
        let store = Store::open_with_lock_wait(&config.storage.path, config.storage.lock_wait)
            .with_context(|| {
                format!("failed to open metadata store {}", config.storage.path.display())
            })?;
        let audit = AuditTrail::open(&config.audit.path).with_context(|| {
            format!("failed to open audit log {}", config.audit.path.display())
        })?;
        let runtime = Runtime::new().context("failed to start async runtime")?;
        Ok(Self {
            options,
            config,
            store: Arc::new(store),
            audit,
            runtime,
        })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Orchestrator over the compose CLI, the supervisor API, and the RCON client.
    pub fn orchestrator(&self) -> Result<Orchestrator> {
        let timing = self.config.lifecycle;
        let shell: Arc<dyn ShellAdapter> = Arc::new(ProcessShell::new());
        let supervisor = HttpSupervisorClient::new(&self.config.supervisor)
            .context("failed to build supervisor client")?;
        let managers: Vec<Arc<dyn ServiceManager>> = vec![
            Arc::new(ComposeServiceManager::new(shell, self.config.shell.clone(), timing)),
            Arc::new(SupervisorServiceManager::new(
                Arc::new(supervisor),
                self.config.supervisor.process_prefix.clone(),
                timing,
            )),
        ];
        Ok(Orchestrator::new(
            Adapters {
                servers: self.store.clone(),
                worlds: self.store.clone(),
                managers,
                console: Arc::new(RconClient::new(self.config.console.timeout)),
                audit: Some(self.audit.clone()),
            },
            OrchestratorConfig::from_app(&self.config, self.console_password()),
        ))
    }

    pub fn credentials(&self) -> CredentialStore {
        CredentialStore::new(self.store.clone(), self.config.credentials)
    }

    pub fn prompt(&self) -> TerminalPrompt {
        TerminalPrompt::new(self.options.assume_yes)
    }

    /// Ask for confirmation. No terminal and no `--yes` reads as "no".
    pub fn confirm(&self, message: &str) -> Result<bool> {
        match self.prompt().confirm(message) {
            Ok(answer) => Ok(answer),
            Err(PromptError::Unavailable(_)) | Err(PromptError::Cancelled) => {
                warn!("no confirmation available; pass --yes to proceed non-interactively");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn console_password(&self) -> Option<String> {
        std::env::var(&self.config.console.password_env)
            .ok()
            .filter(|password| !password.is_empty())
    }
}

/// Docs adapter rooted at the configured directory.
pub fn docs(config: &AppConfig) -> FsDocs {
    FsDocs::new(&config.docs.directory)
}
