//! ---
//! mcctl_section: "15-testing-qa-runbook"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Temporary workspace wiring fakes into an orchestrator."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mcctl_common::{CredentialConfig, LifecycleConfig, ShellConfig};
use mcctl_orchestrator::{
    Adapters, ComposeServiceManager, Orchestrator, OrchestratorConfig, ServiceManager,
    SupervisorServiceManager,
};
use mcctl_persistence::Store;
use mcctl_security::{AuditTrail, CredentialStore, PasswordKdf};
use tempfile::TempDir;

use crate::compose::FakeComposeShell;
use crate::doubles::FakeConsole;
use crate::supervisor::FakeSupervisorClient;

/// Console password the harness configures.
pub const CONSOLE_PASSWORD: &str = "minecraft";

/// Scrypt parameters cheap enough for unit tests.
pub fn cheap_credentials() -> CredentialConfig {
    CredentialConfig {
        log_n: 4,
        r: 8,
        p: 1,
        key_len: 32,
        salt_len: 16,
    }
}

/// Short grace period and poll cadence.
pub fn fast_lifecycle() -> LifecycleConfig {
    LifecycleConfig {
        grace_period: Duration::from_millis(300),
        poll_interval: Duration::from_millis(20),
    }
}

/// Orchestrator over an on-disk temporary store and fake backends.
pub struct Harness {
    /// Metadata store.
    pub store: Arc<Store>,
    /// Audit trail in `dir`.
    pub audit: AuditTrail,
    /// Compose double behind the shell-managed backend.
    pub compose: Arc<FakeComposeShell>,
    /// Supervisor double behind the supervisor-managed backend.
    pub supervisor: Arc<FakeSupervisorClient>,
    /// Console double.
    pub console: Arc<FakeConsole>,
    /// Wired orchestrator.
    pub orchestrator: Orchestrator,
    /// Owns the temporary directory; dropped last.
    pub dir: TempDir,
}

impl Harness {
    /// Harness with [`fast_lifecycle`] timing.
    pub fn new() -> Result<Self> {
        Self::with_lifecycle(fast_lifecycle())
    }

    /// Harness with explicit grace period and poll cadence.
    pub fn with_lifecycle(timing: LifecycleConfig) -> Result<Self> {
        let dir = tempfile::tempdir().context("creating harness directory")?;
        let store = Arc::new(Store::open(dir.path().join("mcctl.redb")).context("opening store")?);
        let audit = AuditTrail::open(dir.path().join("audit.log"))?;
        let compose = Arc::new(FakeComposeShell::new());
        let supervisor = Arc::new(FakeSupervisorClient::new());
        let console = Arc::new(FakeConsole::new(CONSOLE_PASSWORD));

        let shell_config = ShellConfig::default();
        let managers: Vec<Arc<dyn ServiceManager>> = vec![
            Arc::new(ComposeServiceManager::new(compose.clone(), shell_config, timing)),
            Arc::new(SupervisorServiceManager::new(supervisor.clone(), "mc-", timing)),
        ];
        let orchestrator = Orchestrator::new(
            Adapters {
                servers: store.clone(),
                worlds: store.clone(),
                managers,
                console: console.clone(),
                audit: Some(audit.clone()),
            },
            OrchestratorConfig {
                actor: "test:harness".to_owned(),
                console_password: Some(CONSOLE_PASSWORD.to_owned()),
                ..OrchestratorConfig::default()
            },
        );
        Ok(Self {
            store,
            audit,
            compose,
            supervisor,
            console,
            orchestrator,
            dir,
        })
    }

    /// Credential store over the harness store with cheap parameters.
    pub fn credentials(&self) -> CredentialStore {
        CredentialStore::new(self.store.clone(), cheap_credentials())
    }

    /// Credential store using a caller-supplied derivation.
    pub fn credentials_with(&self, kdf: Arc<dyn PasswordKdf>) -> CredentialStore {
        CredentialStore::with_kdf(self.store.clone(), kdf, cheap_credentials())
    }
}
