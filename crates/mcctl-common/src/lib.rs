//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Shared primitives and utilities for the control plane."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! Core shared primitives for the mcctl workspace.
//! This crate exposes configuration loading, tracing bootstrap, and the
//! value types shared by the shell adapter, console bridge, and supervisor.

pub mod config;
pub mod exec;
pub mod logging;
pub mod supervisor;

pub use config::{
    AppConfig, AuditConfig, ConsoleConfig, CredentialConfig, DocsConfig, LifecycleConfig,
    LoadedAppConfig, LoggingConfig, ShellConfig, StorageConfig, SupervisorConfig,
};
pub use exec::CommandExecutionResult;
pub use logging::{init_tracing, LogFormat};
