//! ---
//! mcctl_section: "05-networking-external-interfaces"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Process supervisor daemon library."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! The supervisor owns a table of programs declared in TOML, spawns them on
//! request, tracks their exit, and exposes the control API consumed by
//! supervisor-managed instances.

pub mod api;
pub mod config;
pub mod table;

pub use api::router;
pub use config::{
    load_config, validate_config, ConfigError, ProgramConfig, SupervisorFile, ValidationReport,
};
pub use table::{ProcessTable, TableError};
