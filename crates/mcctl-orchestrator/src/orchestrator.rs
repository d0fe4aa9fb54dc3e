//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Orchestration operations over capability interfaces."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! Orchestration kernel.
//!
//! Every operation takes capability handles assembled by the composition
//! root, never concrete adapters. Lifecycle operations on one instance are
//! serialized through [`InstanceLocks`]; different instances run concurrently.
//! Each operation emits a system event and, when an [`AuditTrail`] is wired,
//! one audit record. Audit write failures are logged and do not fail the
//! operation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use mcctl_common::{AppConfig, CommandExecutionResult};
use mcctl_logging::{log_system_event, mc_warn, LogContext, SystemEventOutcome};
use mcctl_persistence::{
    BackendKind, ConsoleEndpoint, Repository, ServerInstance, ServerInstancePatch,
    ServerRepository, WorldRepository, WorldSave, WorldSavePatch,
};
use mcctl_rcon::{ConsoleBridge, ConsoleTarget};
use mcctl_security::{AuditAction, AuditRecord, AuditTrail};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::OrchestratorError;
use crate::locks::InstanceLocks;
use crate::service::{ServiceManager, StopReport};
use crate::status::LifecycleStatus;

/// Result alias for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Longest accepted instance or world name.
pub const MAX_NAME_LEN: usize = 64;

/// Longest accepted setting key.
pub const MAX_SETTING_KEY_LEN: usize = 128;

const INSTANCE: &str = "instances";
const WORLD: &str = "world_saves";

/// Check an instance or world identifier: ASCII alphanumeric first, then
/// alphanumerics, `_` or `-`, at most [`MAX_NAME_LEN`] characters.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason| OrchestratorError::InvalidName {
        name: name.to_owned(),
        reason,
    };
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("must not be empty")),
        Some(first) if !first.is_ascii_alphanumeric() => {
            return Err(invalid("must start with a letter or digit"))
        }
        Some(_) => {}
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("must be at most 64 characters"));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(invalid("may only contain letters, digits, '_' and '-'"));
    }
    Ok(())
}

/// Check a setting key: non-empty ASCII letters, digits, `_`, `.` or `-`.
pub fn validate_setting_key(key: &str) -> Result<()> {
    let invalid = |reason| OrchestratorError::InvalidSetting {
        key: key.to_owned(),
        reason,
    };
    if key.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if key.len() > MAX_SETTING_KEY_LEN {
        return Err(invalid("must be at most 128 characters"));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(invalid("may only contain letters, digits, '_', '.' and '-'"));
    }
    Ok(())
}

/// Concrete adapters handed to [`Orchestrator::new`].
pub struct Adapters {
    /// Instance metadata.
    pub servers: Arc<dyn ServerRepository>,
    /// World metadata.
    pub worlds: Arc<dyn WorldRepository>,
    /// One manager per backend kind. Later entries replace earlier ones of the same kind.
    pub managers: Vec<Arc<dyn ServiceManager>>,
    /// Remote console client.
    pub console: Arc<dyn ConsoleBridge>,
    /// Audit sink, if any.
    pub audit: Option<AuditTrail>,
}

/// Caller identity and console defaults.
#[derive(Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Actor written to audit records and log events.
    pub actor: String,
    /// Console host used when an instance has no endpoint of its own.
    pub console_host: String,
    /// Console port used when an instance has no endpoint of its own.
    pub console_port: u16,
    /// Console password used when the instance's endpoint carries none.
    pub console_password: Option<String>,
}

impl std::fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("actor", &self.actor)
            .field("console_host", &self.console_host)
            .field("console_port", &self.console_port)
            .field("console_password", &self.console_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            actor: "cli:local".to_owned(),
            console_host: "127.0.0.1".to_owned(),
            console_port: 25575,
            console_password: None,
        }
    }
}

impl OrchestratorConfig {
    /// Settings derived from the application config. The password is resolved by the caller.
    pub fn from_app(config: &AppConfig, console_password: Option<String>) -> Self {
        Self {
            actor: config.audit.actor.clone(),
            console_host: config.console.default_host.clone(),
            console_port: config.console.default_port,
            console_password,
        }
    }
}

/// Parameters of a new instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInstance {
    /// Unique, immutable name.
    pub name: String,
    /// Backend that will drive it.
    pub backend: BackendKind,
    /// Opaque configuration reference (compose file, profile, ...).
    pub config_ref: String,
    /// Optional dedicated console endpoint.
    pub console: Option<ConsoleEndpoint>,
}

/// Parameters of a new world save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorld {
    /// Unique identifier.
    pub id: String,
    /// Parent instance; must exist.
    pub instance: String,
    /// Storage location.
    pub location: PathBuf,
    /// Size on disk.
    pub size_bytes: u64,
}

/// How to stop an instance.
#[derive(Debug, Clone)]
pub struct StopRequest {
    /// Terminate and wait before killing. `false` kills immediately.
    pub graceful: bool,
    /// Required for a forceful stop.
    pub confirmed: bool,
    /// Cuts the grace period short when it turns `true`.
    pub cancel: Option<watch::Receiver<bool>>,
}

impl Default for StopRequest {
    fn default() -> Self {
        Self::graceful()
    }
}

impl StopRequest {
    /// Graceful stop; no confirmation needed.
    pub fn graceful() -> Self {
        Self {
            graceful: true,
            confirmed: false,
            cancel: None,
        }
    }

    /// Immediate kill, already confirmed by the caller.
    pub fn forceful_confirmed() -> Self {
        Self {
            graceful: false,
            confirmed: true,
            cancel: None,
        }
    }

    /// Attach a cancellation flag for the grace-period poll.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// How to delete an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Must be `true`; deletion is destructive.
    pub confirmed: bool,
    /// Stop a running instance first instead of refusing.
    pub force: bool,
    /// Also delete the instance's world records.
    pub cascade_worlds: bool,
}

/// Outcome of an instance deletion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteReport {
    /// The removed record.
    pub instance: ServerInstance,
    /// Stop performed before deletion, if the instance was up.
    pub stop: Option<StopReport>,
    /// World records deleted along with the instance.
    pub removed_worlds: Vec<String>,
    /// World records left pointing at the deleted instance.
    pub orphaned_worlds: Vec<String>,
}

/// Instance record with its derived status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceOverview {
    /// Stored metadata.
    pub instance: ServerInstance,
    /// Live status; `unknown` when the backend could not be asked.
    pub status: LifecycleStatus,
}

/// World record with its parent check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorldView {
    /// Stored metadata.
    pub world: WorldSave,
    /// Parent instance no longer exists.
    pub dangling: bool,
}

/// Per-instance outcome of a batch operation.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Instance name.
    pub instance: String,
    /// What happened to it.
    pub outcome: Result<T>,
}

/// Entry point for every orchestration operation.
pub struct Orchestrator {
    servers: Arc<dyn ServerRepository>,
    worlds: Arc<dyn WorldRepository>,
    managers: HashMap<BackendKind, Arc<dyn ServiceManager>>,
    console: Arc<dyn ConsoleBridge>,
    audit: Option<AuditTrail>,
    locks: InstanceLocks,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Wire the orchestrator from its adapters.
    pub fn new(adapters: Adapters, config: OrchestratorConfig) -> Self {
        let managers = adapters
            .managers
            .into_iter()
            .map(|manager| (manager.kind(), manager))
            .collect();
        Self {
            servers: adapters.servers,
            worlds: adapters.worlds,
            managers,
            console: adapters.console,
            audit: adapters.audit,
            locks: InstanceLocks::new(),
            config,
        }
    }

    /// Actor recorded for operations.
    pub fn actor(&self) -> &str {
        &self.config.actor
    }

    fn manager(&self, backend: BackendKind) -> Result<&Arc<dyn ServiceManager>> {
        self.managers
            .get(&backend)
            .ok_or(OrchestratorError::BackendNotConfigured(backend))
    }

    fn context<'a>(&'a self, operation: &'a str) -> LogContext<'a> {
        LogContext::new()
            .with_operation(operation)
            .with_actor(&self.config.actor)
    }

    /// Emit the system event and audit record for a finished operation.
    fn conclude<T>(
        &self,
        action: AuditAction,
        target_type: &str,
        target: &str,
        details: serde_json::Value,
        result: Result<T>,
    ) -> Result<T> {
        let operation = action.to_string();
        let ctx = self.context(&operation).with_instance(target);
        let record = match &result {
            Ok(_) => {
                log_system_event(
                    Some(&ctx),
                    &operation,
                    "operation completed",
                    SystemEventOutcome::Success,
                );
                AuditRecord::success(self.config.actor.clone(), action, target_type, target)
            }
            Err(err) => {
                let message = err.to_string();
                log_system_event(Some(&ctx), &operation, &message, SystemEventOutcome::Fault);
                let actor = self.config.actor.clone();
                AuditRecord::failure(actor, action, target_type, target, message)
            }
        };
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.record(record.with_details(details)) {
                mc_warn!(context = ctx, "audit write failed: {err:#}");
            }
        }
        result
    }

    fn require_instance(&self, name: &str) -> Result<ServerInstance> {
        self.servers
            .get(name)?
            .ok_or_else(|| OrchestratorError::NotFound {
                kind: INSTANCE,
                id: name.to_owned(),
            })
    }

    fn require_world(&self, id: &str) -> Result<WorldSave> {
        self.worlds.get(id)?.ok_or_else(|| OrchestratorError::NotFound {
            kind: WORLD,
            id: id.to_owned(),
        })
    }

    // ---- instances -------------------------------------------------------

    /// Register a new instance. The process is not started.
    pub fn create_instance(&self, request: NewInstance) -> Result<ServerInstance> {
        let name = request.name.clone();
        let details = json!({ "backend": request.backend, "config_ref": request.config_ref });
        let result = validate_name(&request.name).and_then(|()| {
            let instance = ServerInstance {
                name: request.name,
                backend: request.backend,
                config_ref: request.config_ref,
                console: request.console,
                settings: Default::default(),
                created_at: Utc::now(),
            };
            Ok(self.servers.create(instance)?)
        });
        self.conclude(AuditAction::ServerCreate, "server", &name, details, result)
    }

    /// Stored record of one instance.
    pub fn get_instance(&self, name: &str) -> Result<ServerInstance> {
        self.require_instance(name)
    }

    /// Change an instance's configuration reference, console endpoint, or settings.
    ///
    /// Takes effect the next time the backend starts the instance. An empty
    /// patch returns the stored record untouched.
    pub fn update_instance(
        &self,
        name: &str,
        patch: ServerInstancePatch,
    ) -> Result<ServerInstance> {
        let details = json!({
            "config_ref": patch.config_ref,
            "console": patch.console.as_ref().map(|endpoint| endpoint.is_some()),
            "settings": patch.settings.keys().collect::<Vec<_>>(),
        });
        let result = self.apply_instance_patch(name, patch);
        self.conclude(AuditAction::ServerConfigure, "server", name, details, result)
    }

    fn apply_instance_patch(
        &self,
        name: &str,
        patch: ServerInstancePatch,
    ) -> Result<ServerInstance> {
        for key in patch.settings.keys() {
            validate_setting_key(key)?;
        }
        if patch.is_empty() {
            return self.require_instance(name);
        }
        Ok(self.servers.update(name, patch)?)
    }

    /// Live status of one instance.
    pub async fn instance_status(&self, name: &str) -> Result<LifecycleStatus> {
        let instance = self.require_instance(name)?;
        let manager = self.manager(instance.backend)?;
        manager
            .status(name)
            .await
            .map_err(|err| OrchestratorError::service(name, err))
    }

    /// Every instance with its live status. Backends that cannot be queried yield `unknown`.
    pub async fn list_instances(&self) -> Result<Vec<InstanceOverview>> {
        let instances: Vec<ServerInstance> = self.servers.list()?.collect();
        let queries = instances.into_iter().map(|instance| async move {
            let status = match self.manager(instance.backend) {
                Ok(manager) => match manager.status(&instance.name).await {
                    Ok(status) => status,
                    Err(err) => {
                        warn!(instance = %instance.name, error = %err, "status query failed");
                        LifecycleStatus::Unknown
                    }
                },
                Err(err) => {
                    warn!(instance = %instance.name, error = %err, "no manager for backend");
                    LifecycleStatus::Unknown
                }
            };
            InstanceOverview { instance, status }
        });
        Ok(join_all(queries).await)
    }

    /// Start an instance. Starting a running instance is a no-op.
    pub async fn start_instance(&self, name: &str) -> Result<LifecycleStatus> {
        let result = self.start_locked(name).await;
        self.conclude(AuditAction::ServerStart, "server", name, serde_json::Value::Null, result)
    }

    async fn start_locked(&self, name: &str) -> Result<LifecycleStatus> {
        let instance = self.require_instance(name)?;
        let manager = self.manager(instance.backend)?;
        let _guard = self.locks.acquire(name).await;
        manager
            .start(name)
            .await
            .map_err(|err| OrchestratorError::service(name, err))
    }

    /// Stop an instance. Stopping a stopped instance is a no-op.
    pub async fn stop_instance(&self, name: &str, request: StopRequest) -> Result<StopReport> {
        let details = json!({ "graceful": request.graceful });
        let result = self.stop_locked(name, request).await;
        let details = match &result {
            Ok(report) => json!({
                "graceful": details["graceful"],
                "escalated": report.escalated,
                "cancelled": report.cancelled,
                "final_status": report.final_status,
            }),
            Err(_) => details,
        };
        self.conclude(AuditAction::ServerStop, "server", name, details, result)
    }

    async fn stop_locked(&self, name: &str, request: StopRequest) -> Result<StopReport> {
        if !request.graceful && !request.confirmed {
            return Err(OrchestratorError::ConfirmationRequired("forceful stop"));
        }
        let instance = self.require_instance(name)?;
        let manager = self.manager(instance.backend)?;
        let _guard = self.locks.acquire(name).await;
        manager
            .stop_with_cancel(name, request.graceful, request.cancel)
            .await
            .map_err(|err| OrchestratorError::service(name, err))
    }

    /// Graceful stop followed by start, as one serialized operation.
    pub async fn restart_instance(&self, name: &str) -> Result<LifecycleStatus> {
        let result = self.restart_locked(name).await;
        self.conclude(AuditAction::ServerRestart, "server", name, serde_json::Value::Null, result)
    }

    async fn restart_locked(&self, name: &str) -> Result<LifecycleStatus> {
        let instance = self.require_instance(name)?;
        let manager = self.manager(instance.backend)?;
        let _guard = self.locks.acquire(name).await;
        manager
            .restart(name)
            .await
            .map_err(|err| OrchestratorError::service(name, err))
    }

    /// Remove an instance record after making sure it is stopped.
    pub async fn delete_instance(
        &self,
        name: &str,
        request: DeleteRequest,
    ) -> Result<DeleteReport> {
        let details = json!({ "force": request.force, "cascade_worlds": request.cascade_worlds });
        let result = self.delete_locked(name, request).await;
        self.conclude(AuditAction::ServerDelete, "server", name, details, result)
    }

    async fn delete_locked(&self, name: &str, request: DeleteRequest) -> Result<DeleteReport> {
        if !request.confirmed {
            return Err(OrchestratorError::ConfirmationRequired("instance deletion"));
        }
        let instance = self.require_instance(name)?;
        let manager = self.manager(instance.backend)?;
        let guard = self.locks.acquire(name).await;

        let status = manager
            .status(name)
            .await
            .map_err(|err| OrchestratorError::service(name, err))?;
        let stop = if status.is_halted() {
            None
        } else if !request.force {
            return Err(OrchestratorError::InvalidState {
                instance: name.to_owned(),
                status,
                reason: "stop it first or pass force".to_owned(),
            });
        } else {
            let report = manager
                .stop(name, true)
                .await
                .map_err(|err| OrchestratorError::service(name, err))?;
            if !report.final_status.is_halted() {
                return Err(OrchestratorError::InvalidState {
                    instance: name.to_owned(),
                    status: report.final_status,
                    reason: "instance did not stop".to_owned(),
                });
            }
            Some(report)
        };

        let worlds = self.worlds.list_for_instance(name)?;
        let mut removed_worlds = Vec::new();
        let mut orphaned_worlds = Vec::new();
        for world in worlds {
            if request.cascade_worlds {
                self.worlds.delete(&world.id)?;
                removed_worlds.push(world.id);
            } else {
                orphaned_worlds.push(world.id);
            }
        }
        if !orphaned_worlds.is_empty() {
            warn!(instance = name, worlds = ?orphaned_worlds, "world saves left without a parent");
        }

        let instance = self.servers.delete(&instance.name)?;
        drop(guard);
        self.locks.forget(name);
        Ok(DeleteReport {
            instance,
            stop,
            removed_worlds,
            orphaned_worlds,
        })
    }

    /// Start every instance concurrently.
    pub async fn start_all(&self) -> Result<Vec<BatchOutcome<LifecycleStatus>>> {
        let names: Vec<String> = self.servers.list()?.map(|instance| instance.name).collect();
        let runs = names.into_iter().map(|name| async move {
            let outcome = self.start_instance(&name).await;
            BatchOutcome { instance: name, outcome }
        });
        Ok(join_all(runs).await)
    }

    /// Stop every instance concurrently.
    pub async fn stop_all(&self, request: StopRequest) -> Result<Vec<BatchOutcome<StopReport>>> {
        let names: Vec<String> = self.servers.list()?.map(|instance| instance.name).collect();
        let runs = names.into_iter().map(|name| {
            let request = request.clone();
            async move {
                let outcome = self.stop_instance(&name, request).await;
                BatchOutcome { instance: name, outcome }
            }
        });
        Ok(join_all(runs).await)
    }

    // ---- worlds ----------------------------------------------------------

    /// Register a world save under an existing instance.
    pub fn create_world(&self, request: NewWorld) -> Result<WorldSave> {
        let id = request.id.clone();
        let details = json!({ "instance": request.instance });
        let result = validate_name(&request.id).and_then(|()| {
            self.require_instance(&request.instance)?;
            let world = WorldSave {
                id: request.id,
                instance: request.instance,
                location: request.location,
                size_bytes: request.size_bytes,
                last_modified: Utc::now(),
                locked_by: None,
            };
            Ok(self.worlds.create(world)?)
        });
        self.conclude(AuditAction::WorldCreate, "world", &id, details, result)
    }

    /// World saves, optionally of one instance, flagged when their parent is gone.
    pub fn list_worlds(&self, instance: Option<&str>) -> Result<Vec<WorldView>> {
        let worlds: Vec<WorldSave> = match instance {
            Some(name) => self.worlds.list_for_instance(name)?,
            None => self.worlds.list()?.collect(),
        };
        let mut views = Vec::with_capacity(worlds.len());
        for world in worlds {
            let dangling = self.servers.get(&world.instance)?.is_none();
            if dangling {
                warn!(
                    world = %world.id,
                    instance = %world.instance,
                    "world references a missing instance"
                );
            }
            views.push(WorldView { world, dangling });
        }
        Ok(views)
    }

    /// Move a world save to another existing instance, which then holds it.
    ///
    /// Refused while another existing instance holds the world. A lock left by
    /// a deleted instance does not block.
    pub fn assign_world(&self, id: &str, instance: &str) -> Result<WorldSave> {
        let details = json!({ "instance": instance });
        let result = self.reassign(id, instance);
        self.conclude(AuditAction::WorldAssign, "world", id, details, result)
    }

    fn reassign(&self, id: &str, instance: &str) -> Result<WorldSave> {
        let world = self.require_world(id)?;
        self.require_instance(instance)?;
        if world.is_held_by_other(instance) {
            if let Some(holder) = &world.locked_by {
                if self.servers.get(holder)?.is_some() {
                    return Err(OrchestratorError::WorldLocked {
                        world: id.to_owned(),
                        holder: holder.clone(),
                    });
                }
                warn!(world = id, holder = %holder, "overriding lock held by a deleted instance");
            }
        }
        let patch = WorldSavePatch {
            instance: Some(instance.to_owned()),
            locked_by: Some(Some(instance.to_owned())),
            ..WorldSavePatch::default()
        };
        Ok(self.worlds.update(id, patch)?)
    }

    /// Release the lock on a world save.
    ///
    /// Refused while the holder is up unless `force` is set.
    pub async fn release_world(&self, id: &str, force: bool) -> Result<WorldSave> {
        let details = json!({ "force": force });
        let result = self.release_locked(id, force).await;
        self.conclude(AuditAction::WorldRelease, "world", id, details, result)
    }

    async fn release_locked(&self, id: &str, force: bool) -> Result<WorldSave> {
        let world = self.require_world(id)?;
        let holder = world
            .locked_by
            .clone()
            .ok_or_else(|| OrchestratorError::WorldNotLocked(id.to_owned()))?;
        if !force {
            if let Some(instance) = self.servers.get(&holder)? {
                let manager = self.manager(instance.backend)?;
                let _guard = self.locks.acquire(&holder).await;
                let status = manager
                    .status(&holder)
                    .await
                    .map_err(|err| OrchestratorError::service(&holder, err))?;
                if !status.is_halted() {
                    return Err(OrchestratorError::InvalidState {
                        instance: holder,
                        status,
                        reason: format!("it still uses world '{id}'; stop it first or pass force"),
                    });
                }
            }
        }
        let patch = WorldSavePatch {
            locked_by: Some(None),
            ..WorldSavePatch::default()
        };
        Ok(self.worlds.update(id, patch)?)
    }

    /// Remove a world record.
    pub fn delete_world(&self, id: &str, confirmed: bool) -> Result<WorldSave> {
        let result = if confirmed {
            self.worlds.delete(id).map_err(OrchestratorError::from)
        } else {
            Err(OrchestratorError::ConfirmationRequired("world deletion"))
        };
        self.conclude(AuditAction::WorldDelete, "world", id, serde_json::Value::Null, result)
    }

    // ---- console ---------------------------------------------------------

    /// Run one console command against a running instance.
    pub async fn console_command(
        &self,
        name: &str,
        command: &str,
    ) -> Result<CommandExecutionResult> {
        let details = json!({ "command": command });
        let result = self.console_locked(name, command).await;
        self.conclude(AuditAction::ConsoleExec, "server", name, details, result)
    }

    async fn console_locked(&self, name: &str, command: &str) -> Result<CommandExecutionResult> {
        let instance = self.require_instance(name)?;
        let manager = self.manager(instance.backend)?;
        let status = manager
            .status(name)
            .await
            .map_err(|err| OrchestratorError::service(name, err))?;
        if status != LifecycleStatus::Running {
            return Err(OrchestratorError::InvalidState {
                instance: name.to_owned(),
                status,
                reason: "console requires a running instance".to_owned(),
            });
        }
        let target = self.console_target(&instance);
        debug!(instance = name, address = %target.address(), "opening console session");
        self.console
            .execute(&target, command)
            .await
            .map_err(|source| OrchestratorError::Console {
                instance: name.to_owned(),
                source,
            })
    }

    fn console_target(&self, instance: &ServerInstance) -> ConsoleTarget {
        let fallback_password = self.config.console_password.clone().unwrap_or_default();
        match &instance.console {
            Some(endpoint) => ConsoleTarget {
                host: endpoint.host.clone(),
                port: endpoint.port,
                password: endpoint.password.clone().unwrap_or(fallback_password),
            },
            None => ConsoleTarget {
                host: self.config.console_host.clone(),
                port: self.config.console_port,
                password: fallback_password,
            },
        }
    }
}
