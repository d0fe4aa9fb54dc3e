//! ---
//! mcctl_section: "03-persistence-logging"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Persisted records for instances, world saves, and credentials."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::repository::Record;

/// How an instance's process is driven.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BackendKind {
    /// Compose CLI invocations through the shell adapter.
    ShellManaged,
    /// Requests forwarded to the always-on process supervisor.
    SupervisorManaged,
}

/// Remote console address and pre-shared password for one instance.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEndpoint {
    /// Host name or address of the console listener.
    pub host: String,
    /// TCP port of the console listener.
    pub port: u16,
    /// Pre-shared password. Falls back to the configured environment variable when absent.
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for ConsoleEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One managed game server. Lifecycle status is derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInstance {
    /// Unique, immutable instance name.
    pub name: String,
    /// Backend driving the instance.
    pub backend: BackendKind,
    /// Path or key of the instance's runtime configuration.
    pub config_ref: String,
    /// Console endpoint, when the instance exposes one.
    #[serde(default)]
    pub console: Option<ConsoleEndpoint>,
    /// Server settings (`KEY=value`) in the order they were first set.
    #[serde(default)]
    pub settings: IndexMap<String, String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// Mutable fields of a [`ServerInstance`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInstancePatch {
    /// Replacement configuration reference.
    pub config_ref: Option<String>,
    /// Replacement console endpoint; `Some(None)` clears it.
    pub console: Option<Option<ConsoleEndpoint>>,
    /// Settings to change: `Some` sets the key, `None` removes it.
    pub settings: IndexMap<String, Option<String>>,
}

impl ServerInstancePatch {
    /// True when applying the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.config_ref.is_none() && self.console.is_none() && self.settings.is_empty()
    }
}

impl Record for ServerInstance {
    type Patch = ServerInstancePatch;
    const TABLE: &'static str = "instances";

    fn id(&self) -> &str {
        &self.name
    }

    fn apply(&mut self, patch: Self::Patch) {
        if let Some(config_ref) = patch.config_ref {
            self.config_ref = config_ref;
        }
        if let Some(console) = patch.console {
            self.console = console;
        }
        for (key, value) in patch.settings {
            match value {
                Some(value) => {
                    self.settings.insert(key, value);
                }
                None => {
                    self.settings.shift_remove(&key);
                }
            }
        }
    }
}

/// A world data set associated with an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSave {
    /// Unique world identifier.
    pub id: String,
    /// Parent instance name. A relation, not ownership.
    pub instance: String,
    /// Where the world data lives on disk.
    pub location: PathBuf,
    /// Size of the world data in bytes.
    pub size_bytes: u64,
    /// Last time the world data changed.
    pub last_modified: DateTime<Utc>,
    /// Instance currently holding the world. Another instance cannot take it until released.
    #[serde(default)]
    pub locked_by: Option<String>,
}

impl WorldSave {
    /// True when held by an instance other than `instance`.
    pub fn is_held_by_other(&self, instance: &str) -> bool {
        self.locked_by
            .as_deref()
            .map_or(false, |holder| holder != instance)
    }
}

/// Mutable fields of a [`WorldSave`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldSavePatch {
    /// New parent instance.
    pub instance: Option<String>,
    /// New storage location.
    pub location: Option<PathBuf>,
    /// New size in bytes.
    pub size_bytes: Option<u64>,
    /// New modification time.
    pub last_modified: Option<DateTime<Utc>>,
    /// New holder; `Some(None)` releases the world.
    pub locked_by: Option<Option<String>>,
}

impl Record for WorldSave {
    type Patch = WorldSavePatch;
    const TABLE: &'static str = "world_saves";

    fn id(&self) -> &str {
        &self.id
    }

    fn apply(&mut self, patch: Self::Patch) {
        if let Some(instance) = patch.instance {
            self.instance = instance;
        }
        if let Some(location) = patch.location {
            self.location = location;
        }
        if let Some(size_bytes) = patch.size_bytes {
            self.size_bytes = size_bytes;
        }
        if let Some(last_modified) = patch.last_modified {
            self.last_modified = last_modified;
        }
        if let Some(locked_by) = patch.locked_by {
            self.locked_by = locked_by;
        }
    }
}

/// scrypt cost parameters recorded alongside each hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost `N`.
    pub log_n: u8,
    /// Block size.
    pub r: u32,
    /// Parallelism.
    pub p: u32,
    /// Derived key length in bytes.
    pub key_len: usize,
}

/// Salt and derived hash pair. Replaced as a unit on rotation.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSecret {
    /// Random per-credential salt.
    #[serde(with = "hex::serde")]
    pub salt: Vec<u8>,
    /// KDF output over salt and password.
    #[serde(with = "hex::serde")]
    pub hash: Vec<u8>,
    /// Parameters the hash was derived with.
    pub params: KdfParams,
}

impl fmt::Debug for CredentialSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSecret")
            .field("salt_len", &self.salt.len())
            .field("hash_len", &self.hash.len())
            .field("params", &self.params)
            .finish()
    }
}

/// Administrator credential as persisted. Never holds plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Unique username.
    pub username: String,
    /// Current salt and hash.
    pub secret: CredentialSecret,
    /// When the credential was registered.
    pub created_at: DateTime<Utc>,
    /// Last successful verification.
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    /// Last password rotation.
    #[serde(default)]
    pub rotated_at: Option<DateTime<Utc>>,
}

/// Mutable fields of a [`StoredCredential`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialPatch {
    /// Replacement secret together with its rotation time.
    pub secret: Option<(CredentialSecret, DateTime<Utc>)>,
    /// New last-used time.
    pub last_used: Option<DateTime<Utc>>,
}

impl Record for StoredCredential {
    type Patch = CredentialPatch;
    const TABLE: &'static str = "credentials";

    fn id(&self) -> &str {
        &self.username
    }

    fn apply(&mut self, patch: Self::Patch) {
        if let Some((secret, rotated_at)) = patch.secret {
            self.secret = secret;
            self.rotated_at = Some(rotated_at);
        }
        if let Some(last_used) = patch.last_used {
            self.last_used = Some(last_used);
        }
    }
}
