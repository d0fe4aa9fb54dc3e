//! ---
//! mcctl_section: "01-core-functionality"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Error taxonomy and failure classification."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::time::Duration;

use mcctl_persistence::{BackendKind, PersistenceError};
use mcctl_rcon::RconError;
use mcctl_shell::ShellError;
use strum::Display;

use crate::status::LifecycleStatus;

/// Failure of a service manager backend.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The backend tool could not be started.
    #[error(transparent)]
    Spawn(#[from] ShellError),
    /// The backend tool or request outlived its timeout.
    #[error("{action} timed out after {elapsed:?}")]
    Timeout {
        /// Operation that was attempted.
        action: String,
        /// How long it ran before being abandoned.
        elapsed: Duration,
    },
    /// The backend ran and refused.
    #[error("{action} failed: {detail}")]
    CommandFailed {
        /// Operation that was attempted.
        action: String,
        /// Backend-provided explanation.
        detail: String,
    },
    /// The supervisor daemon could not be reached.
    #[error("supervisor unreachable: {0}")]
    Unreachable(String),
    /// The supervisor daemon answered with an error status.
    #[error("supervisor returned {status}: {message}")]
    Supervisor {
        /// HTTP status code.
        status: u16,
        /// Error body.
        message: String,
    },
    /// The supervisor has no process entry by that name.
    #[error("supervisor has no process named '{0}'")]
    NotRegistered(String),
}

/// Failure raised by an orchestration operation.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Instance or world identifier is malformed.
    #[error("invalid name '{name}': {reason}")]
    InvalidName {
        /// Offending name.
        name: String,
        /// Rule it broke.
        reason: &'static str,
    },
    /// Referenced entity does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Entity kind.
        kind: &'static str,
        /// Identifier looked up.
        id: String,
    },
    /// Entity with that identifier already exists.
    #[error("{kind} '{id}' already exists")]
    DuplicateId {
        /// Entity kind.
        kind: &'static str,
        /// Conflicting identifier.
        id: String,
    },
    /// Operation incompatible with the instance's lifecycle state.
    #[error("instance '{instance}' is {status}: {reason}")]
    InvalidState {
        /// Instance name.
        instance: String,
        /// Status observed when the operation was refused.
        status: LifecycleStatus,
        /// Why the operation was refused.
        reason: String,
    },
    /// World save is held by another instance.
    #[error("world '{world}' is locked by '{holder}'")]
    WorldLocked {
        /// World identifier.
        world: String,
        /// Instance holding it.
        holder: String,
    },
    /// Release requested for a world no instance holds.
    #[error("world '{0}' is not locked")]
    WorldNotLocked(String),
    /// Setting key rejected before anything was written.
    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting {
        /// Offending key.
        key: String,
        /// Rule it broke.
        reason: &'static str,
    },
    /// A destructive operation was requested without confirmation.
    #[error("{0} requires explicit confirmation")]
    ConfirmationRequired(&'static str),
    /// No service manager is wired for the instance's backend.
    #[error("no service manager configured for {0} instances")]
    BackendNotConfigured(BackendKind),
    /// A service manager failed.
    #[error("instance '{instance}': {source}")]
    Service {
        /// Instance name.
        instance: String,
        /// Backend failure.
        #[source]
        source: ServiceError,
    },
    /// The console bridge failed.
    #[error("console of '{instance}': {source}")]
    Console {
        /// Instance name.
        instance: String,
        /// Console failure.
        #[source]
        source: RconError,
    },
    /// The metadata store failed.
    #[error(transparent)]
    Storage(PersistenceError),
}

impl From<PersistenceError> for OrchestratorError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound { kind, id } => OrchestratorError::NotFound { kind, id },
            PersistenceError::DuplicateId { kind, id } => {
                OrchestratorError::DuplicateId { kind, id }
            }
            other => OrchestratorError::Storage(other),
        }
    }
}

/// Who is expected to act on a failure; drives CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorClass {
    /// Caller supplied bad input or asked for something not allowed now.
    User,
    /// A backend (compose, supervisor, console) failed or is unreachable.
    Backend,
    /// Local storage or an unexpected fault.
    Internal,
}

/// Failure kinds shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    /// A process could not be spawned.
    SpawnFailure,
    /// An operation outlived its bound.
    Timeout,
    /// A referenced entity is absent.
    NotFound,
    /// An identifier is already taken.
    DuplicateId,
    /// Console password rejected.
    AuthenticationFailed,
    /// Remote endpoint not accepting connections.
    ConnectionRefused,
    /// Metadata store fault.
    StorageError,
    /// Operation conflicts with lifecycle state or lacks confirmation.
    InvalidState,
    /// Resource is held by another owner.
    Conflict,
    /// Input rejected before any backend was consulted.
    InvalidInput,
    /// Backend ran and reported failure.
    BackendFailure,
}

impl OrchestratorError {
    pub(crate) fn service(instance: &str, source: ServiceError) -> Self {
        OrchestratorError::Service {
            instance: instance.to_owned(),
            source,
        }
    }

    /// Taxonomy kind of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::InvalidName { .. } | OrchestratorError::InvalidSetting { .. } => {
                ErrorKind::InvalidInput
            }
            OrchestratorError::WorldLocked { .. } => ErrorKind::Conflict,
            OrchestratorError::WorldNotLocked(_) => ErrorKind::InvalidState,
            OrchestratorError::NotFound { .. } => ErrorKind::NotFound,
            OrchestratorError::DuplicateId { .. } => ErrorKind::DuplicateId,
            OrchestratorError::InvalidState { .. } | OrchestratorError::ConfirmationRequired(_) => {
                ErrorKind::InvalidState
            }
            OrchestratorError::BackendNotConfigured(_) => ErrorKind::BackendFailure,
            OrchestratorError::Service { source, .. } => match source {
                ServiceError::Spawn(ShellError::SpawnFailure { .. }) => ErrorKind::SpawnFailure,
                ServiceError::Timeout { .. } => ErrorKind::Timeout,
                ServiceError::Unreachable(_) => ErrorKind::ConnectionRefused,
                ServiceError::NotRegistered(_) => ErrorKind::NotFound,
                _ => ErrorKind::BackendFailure,
            },
            OrchestratorError::Console { source, .. } => match source {
                RconError::AuthenticationFailed => ErrorKind::AuthenticationFailed,
                RconError::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
                RconError::Timeout(_) => ErrorKind::Timeout,
                _ => ErrorKind::BackendFailure,
            },
            OrchestratorError::Storage(_) => ErrorKind::StorageError,
        }
    }

    /// Classification used by callers to pick exit codes or HTTP statuses.
    pub fn class(&self) -> ErrorClass {
        match self {
            OrchestratorError::InvalidName { .. }
            | OrchestratorError::InvalidSetting { .. }
            | OrchestratorError::WorldLocked { .. }
            | OrchestratorError::WorldNotLocked(_)
            | OrchestratorError::NotFound { .. }
            | OrchestratorError::DuplicateId { .. }
            | OrchestratorError::InvalidState { .. }
            | OrchestratorError::ConfirmationRequired(_) => ErrorClass::User,
            OrchestratorError::BackendNotConfigured(_)
            | OrchestratorError::Service { .. }
            | OrchestratorError::Console { .. } => ErrorClass::Backend,
            OrchestratorError::Storage(_) => ErrorClass::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn persistence_errors_keep_their_kind() {
        let err: OrchestratorError = PersistenceError::NotFound {
            kind: "instances",
            id: "x".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.class(), ErrorClass::User);

        let err: OrchestratorError = PersistenceError::Storage("disk full".into()).into();
        assert_eq!(err.kind(), ErrorKind::StorageError);
        assert_eq!(err.class(), ErrorClass::Internal);
    }

    #[test]
    fn spawn_failures_are_backend_errors() {
        let shell = ShellError::SpawnFailure {
            command: "docker".into(),
            kind: mcctl_shell::SpawnFailureKind::NotFound,
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let err = OrchestratorError::service("lobby", ServiceError::from(shell));
        assert_eq!(err.kind(), ErrorKind::SpawnFailure);
        assert_eq!(err.class(), ErrorClass::Backend);
    }

    #[test]
    fn console_auth_failure_is_classified() {
        let err = OrchestratorError::Console {
            instance: "lobby".into(),
            source: RconError::AuthenticationFailed,
        };
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(err.class(), ErrorClass::Backend);
        let unconfirmed = OrchestratorError::ConfirmationRequired("delete");
        assert!(unconfirmed.to_string().contains("confirmation"));
    }

    #[test]
    fn world_lock_conflicts_are_user_errors() {
        let err = OrchestratorError::WorldLocked {
            world: "overworld".into(),
            holder: "survival-1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.class(), ErrorClass::User);
        assert_eq!(err.to_string(), "world 'overworld' is locked by 'survival-1'");
        assert_eq!(OrchestratorError::WorldNotLocked("w".into()).class(), ErrorClass::User);
    }
}
