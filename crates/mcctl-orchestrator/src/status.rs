//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Backend-agnostic lifecycle status."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Observable run-state of an instance, identical across backends.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LifecycleStatus {
    /// Process is up.
    Running,
    /// Process is being brought up.
    Starting,
    /// Process is shutting down.
    Stopping,
    /// Process is absent or exited.
    Stopped,
    /// Backend reports a crashed or dead process.
    Error,
    /// Backend could not be queried.
    Unknown,
}

impl LifecycleStatus {
    /// Up or on its way up.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            LifecycleStatus::Running | LifecycleStatus::Starting | LifecycleStatus::Stopping
        )
    }

    /// Nothing left to stop.
    pub fn is_halted(self) -> bool {
        matches!(self, LifecycleStatus::Stopped | LifecycleStatus::Error)
    }
}
