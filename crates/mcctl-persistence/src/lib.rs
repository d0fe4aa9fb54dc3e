//! ---
//! mcctl_section: "03-persistence-logging"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Persistence abstractions and storage bindings."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Record types, repository traits, and the redb-backed [`Store`].

/// Result alias used throughout the persistence crate.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Error type for the persistence subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// No record with the given key exists.
    #[error("{kind} '{id}' not found")]
    NotFound {
        /// Record kind (table name).
        kind: &'static str,
        /// Key that was looked up.
        id: String,
    },
    /// A record with the given key already exists.
    #[error("{kind} '{id}' already exists")]
    DuplicateId {
        /// Record kind (table name).
        kind: &'static str,
        /// Conflicting key.
        id: String,
    },
    /// The embedded database reported a fault (disk, corruption).
    #[error("storage error: {0}")]
    Storage(String),
    /// Another process kept the database file open past the lock wait.
    #[error("metadata store {} is held by another process (waited {waited:?})", path.display())]
    Busy {
        /// Database file.
        path: std::path::PathBuf,
        /// How long the operation waited.
        waited: std::time::Duration,
    },
    /// A stored row could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Filesystem error while preparing the database location.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PersistenceError {
    /// True when the error reports a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistenceError::NotFound { .. })
    }
}

pub mod models;
pub mod repository;
pub mod store;

pub use models::{
    BackendKind, ConsoleEndpoint, CredentialPatch, CredentialSecret, KdfParams,
    ServerInstance, ServerInstancePatch, StoredCredential, WorldSave, WorldSavePatch,
};
pub use repository::{
    CredentialRepository, Record, RecordStream, Repository, ServerRepository, WorldRepository,
};
pub use store::{Store, DEFAULT_LOCK_WAIT};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_record() {
        let err = PersistenceError::NotFound {
            kind: "instances",
            id: "survival-1".into(),
        };
        assert_eq!(err.to_string(), "instances 'survival-1' not found");
        assert!(err.is_not_found());
        let dup = PersistenceError::DuplicateId {
            kind: "world_saves",
            id: "w1".into(),
        };
        assert!(!dup.is_not_found());
    }
}
