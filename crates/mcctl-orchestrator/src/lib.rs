//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Lifecycle orchestration crate root."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Backend-agnostic orchestration of game-server instances.
//!
//! Callers build an [`Orchestrator`] from [`Adapters`] once, in a composition
//! root, and then call its operations. Service managers, repositories, the
//! console bridge, prompts, and docs are all reached through traits.

pub mod compose;
pub mod docs;
pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod prompt;
pub mod service;
pub mod status;
pub mod supervisor;

pub use compose::{parse_ps_output, ComposeServiceManager};
pub use docs::{DocTopic, DocsAdapter, DocsError, EnvVarDoc, EnvVarKind, FsDocs};
pub use error::{ErrorClass, ErrorKind, OrchestratorError, ServiceError};
pub use locks::InstanceLocks;
pub use orchestrator::{
    validate_name, validate_setting_key, Adapters, BatchOutcome, DeleteReport, DeleteRequest,
    InstanceOverview, NewInstance, NewWorld, Orchestrator, OrchestratorConfig, StopRequest,
    WorldView, MAX_NAME_LEN, MAX_SETTING_KEY_LEN,
};
pub use prompt::{ApiPrompt, PromptAdapter, PromptError};
pub use service::{settle_window, ServiceManager, StopReport, StopSignal};
pub use status::LifecycleStatus;
pub use supervisor::{
    lifecycle_from_process, HttpSupervisorClient, SupervisorClient, SupervisorServiceManager,
};
