//! ---
//! mcctl_section: "06-security-access-control"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Credential store, password derivation, and audit trail."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod audit;
pub mod credentials;
pub mod kdf;

pub use audit::{
    AuditAction, AuditEntry, AuditFilter, AuditLog, AuditRecord, AuditStatus, AuditTrail,
};
pub use credentials::{Credential, CredentialError, CredentialStore};
pub use kdf::{generate_salt, PasswordKdf, ScryptKdf, DUMMY_SALT};
