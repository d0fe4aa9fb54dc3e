//! ---
//! mcctl_section: "06-security-access-control"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Local administrator credential store."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! Administrator credentials for the local console.
//!
//! Only the salt and derived hash are persisted. `verify` always runs exactly one
//! derivation, including for unknown usernames, and compares in constant time. The
//! decoy derivation for an unknown username uses the cost parameters most stored
//! hashes carry, so raising the configured cost does not make unknown names cheaper
//! to reject than existing ones.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mcctl_common::CredentialConfig;
use mcctl_persistence::{
    CredentialPatch, CredentialRepository, CredentialSecret, KdfParams, PersistenceError,
    StoredCredential,
};
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{debug, info};

use crate::kdf::{generate_salt, PasswordKdf, ScryptKdf, DUMMY_SALT};

const MAX_USERNAME_LEN: usize = 64;

/// Errors raised by the credential store.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Username already registered.
    #[error("username '{0}' is already registered")]
    DuplicateUsername(String),
    /// Username not registered.
    #[error("username '{0}' not found")]
    NotFound(String),
    /// Username is empty, too long, or contains whitespace.
    #[error("invalid username '{0}'")]
    InvalidUsername(String),
    /// Empty passwords are refused.
    #[error("password must not be empty")]
    EmptyPassword,
    /// KDF cost parameters were rejected.
    #[error("invalid key derivation parameters: {0}")]
    InvalidParams(String),
    /// The backing store failed. Never swallowed.
    #[error("credential storage error: {0}")]
    Storage(#[source] PersistenceError),
}

impl CredentialError {
    fn from_persistence(username: &str, err: PersistenceError) -> Self {
        match err {
            PersistenceError::DuplicateId { .. } => {
                CredentialError::DuplicateUsername(username.to_owned())
            }
            PersistenceError::NotFound { .. } => CredentialError::NotFound(username.to_owned()),
            other => CredentialError::Storage(other),
        }
    }

    /// True for caller mistakes as opposed to storage faults.
    pub fn is_user_error(&self) -> bool {
        !matches!(
            self,
            CredentialError::Storage(_) | CredentialError::InvalidParams(_)
        )
    }
}

/// Public view of a credential. Carries no secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credential {
    /// Unique username.
    pub username: String,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Last successful verification.
    pub last_used: Option<DateTime<Utc>>,
    /// Last rotation.
    pub rotated_at: Option<DateTime<Utc>>,
}

impl From<&StoredCredential> for Credential {
    fn from(stored: &StoredCredential) -> Self {
        Self {
            username: stored.username.clone(),
            created_at: stored.created_at,
            last_used: stored.last_used,
            rotated_at: stored.rotated_at,
        }
    }
}

/// Register, verify, and rotate administrator passwords.
#[derive(Clone)]
pub struct CredentialStore {
    repo: Arc<dyn CredentialRepository>,
    kdf: Arc<dyn PasswordKdf>,
    config: CredentialConfig,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Store using scrypt with the configured cost parameters.
    pub fn new(repo: Arc<dyn CredentialRepository>, config: CredentialConfig) -> Self {
        Self::with_kdf(repo, Arc::new(ScryptKdf), config)
    }

    /// Store using a caller-supplied derivation.
    pub fn with_kdf(
        repo: Arc<dyn CredentialRepository>,
        kdf: Arc<dyn PasswordKdf>,
        config: CredentialConfig,
    ) -> Self {
        Self { repo, kdf, config }
    }

    fn params(&self) -> KdfParams {
        KdfParams {
            log_n: self.config.log_n,
            r: self.config.r,
            p: self.config.p,
            key_len: self.config.key_len,
        }
    }

    /// Parameters shared by the most stored credentials, or the configured ones when
    /// nothing is stored yet.
    fn decoy_params(&self) -> Result<KdfParams, CredentialError> {
        let mut tally: Vec<(KdfParams, usize)> = Vec::new();
        for stored in self.repo.list().map_err(CredentialError::Storage)? {
            let params = stored.secret.params;
            match tally.iter_mut().find(|(seen, _)| *seen == params) {
                Some((_, count)) => *count += 1,
                None => tally.push((params, 1)),
            }
        }
        Ok(tally
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map_or_else(|| self.params(), |(params, _)| params))
    }

    fn new_secret(&self, password: &str) -> Result<CredentialSecret, CredentialError> {
        if password.is_empty() {
            return Err(CredentialError::EmptyPassword);
        }
        let params = self.params();
        let salt = generate_salt(self.config.salt_len);
        let hash = self.kdf.derive(password.as_bytes(), &salt, &params)?;
        Ok(CredentialSecret {
            salt,
            hash: hash.to_vec(),
            params,
        })
    }

    /// Register a new administrator.
    pub fn register(&self, username: &str, password: &str) -> Result<Credential, CredentialError> {
        validate_username(username)?;
        let secret = self.new_secret(password)?;
        let record = StoredCredential {
            username: username.to_owned(),
            secret,
            created_at: Utc::now(),
            last_used: None,
            rotated_at: None,
        };
        let stored = self
            .repo
            .create(record)
            .map_err(|err| CredentialError::from_persistence(username, err))?;
        info!(%username, "administrator registered");
        Ok(Credential::from(&stored))
    }

    /// Check a password. Unknown usernames return `false` after a decoy derivation.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, CredentialError> {
        let stored = self
            .repo
            .get(username)
            .map_err(|err| CredentialError::from_persistence(username, err))?;
        let Some(stored) = stored else {
            let params = self.decoy_params()?;
            self.kdf.derive(password.as_bytes(), DUMMY_SALT, &params)?;
            debug!(%username, "verification for unknown username");
            return Ok(false);
        };

        let derived = self.kdf.derive(
            password.as_bytes(),
            &stored.secret.salt,
            &stored.secret.params,
        )?;
        let matches: bool = derived
            .as_slice()
            .ct_eq(stored.secret.hash.as_slice())
            .into();
        if matches {
            self.repo
                .update(
                    username,
                    CredentialPatch {
                        last_used: Some(Utc::now()),
                        ..CredentialPatch::default()
                    },
                )
                .map_err(|err| CredentialError::from_persistence(username, err))?;
        }
        debug!(%username, matches, "verification completed");
        Ok(matches)
    }

    /// Replace the salt and hash of an existing administrator in one write.
    pub fn rotate(
        &self,
        username: &str,
        new_password: &str,
    ) -> Result<Credential, CredentialError> {
        let secret = self.new_secret(new_password)?;
        let updated = self
            .repo
            .update(
                username,
                CredentialPatch {
                    secret: Some((secret, Utc::now())),
                    ..CredentialPatch::default()
                },
            )
            .map_err(|err| CredentialError::from_persistence(username, err))?;
        info!(%username, "administrator password rotated");
        Ok(Credential::from(&updated))
    }

    /// All registered administrators in registration order.
    pub fn list(&self) -> Result<Vec<Credential>, CredentialError> {
        let stream = self
            .repo
            .list()
            .map_err(CredentialError::Storage)?;
        Ok(stream.map(|stored| Credential::from(&stored)).collect())
    }
}

fn validate_username(username: &str) -> Result<(), CredentialError> {
    if username.is_empty()
        || username.len() > MAX_USERNAME_LEN
        || username.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(CredentialError::InvalidUsername(username.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcctl_persistence::Store;

    fn store() -> CredentialStore {
        let repo = Arc::new(Store::in_memory().unwrap());
        CredentialStore::new(
            repo,
            CredentialConfig {
                log_n: 4,
                r: 8,
                p: 1,
                key_len: 32,
                salt_len: 16,
            },
        )
    }

    #[test]
    fn register_then_verify() {
        let store = store();
        let credential = store.register("alice", "s3cret!").unwrap();
        assert_eq!(credential.username, "alice");
        assert!(credential.last_used.is_none());
        assert!(store.verify("alice", "s3cret!").unwrap());
        assert!(!store.verify("alice", "s3cret?").unwrap());
        assert!(!store.verify("alice", "s3cret").unwrap());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let store = store();
        store.register("alice", "one").unwrap();
        assert!(matches!(
            store.register("alice", "two"),
            Err(CredentialError::DuplicateUsername(name)) if name == "alice"
        ));
    }

    #[test]
    fn rotate_unknown_user_is_not_found() {
        let store = store();
        assert!(matches!(
            store.rotate("bob", "pw"),
            Err(CredentialError::NotFound(name)) if name == "bob"
        ));
    }

    #[test]
    fn successful_verify_records_last_use() {
        let store = store();
        store.register("alice", "s3cret!").unwrap();
        store.verify("alice", "wrong").unwrap();
        assert!(store.list().unwrap()[0].last_used.is_none());
        store.verify("alice", "s3cret!").unwrap();
        assert!(store.list().unwrap()[0].last_used.is_some());
    }

    #[test]
    fn rejects_bad_input() {
        let store = store();
        assert!(matches!(
            store.register("", "pw"),
            Err(CredentialError::InvalidUsername(_))
        ));
        assert!(matches!(
            store.register("al ice", "pw"),
            Err(CredentialError::InvalidUsername(_))
        ));
        assert!(matches!(
            store.register("alice", ""),
            Err(CredentialError::EmptyPassword)
        ));
        assert!(CredentialError::EmptyPassword.is_user_error());
    }
}
