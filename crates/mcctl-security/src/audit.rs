//! ---
//! mcctl_section: "06-security-access-control"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Hash-chained audit trail of administrative operations."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};
use uuid::Uuid;

const GENESIS_HASH_LEN: usize = 64;

/// Operation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum AuditAction {
    /// Instance registered.
    #[serde(rename = "server.create")]
    #[strum(serialize = "server.create")]
    ServerCreate,
    /// Instance removed.
    #[serde(rename = "server.delete")]
    #[strum(serialize = "server.delete")]
    ServerDelete,
    /// Instance started.
    #[serde(rename = "server.start")]
    #[strum(serialize = "server.start")]
    ServerStart,
    /// Instance stopped.
    #[serde(rename = "server.stop")]
    #[strum(serialize = "server.stop")]
    ServerStop,
    /// Instance restarted.
    #[serde(rename = "server.restart")]
    #[strum(serialize = "server.restart")]
    ServerRestart,
    /// Instance settings changed.
    #[serde(rename = "server.configure")]
    #[strum(serialize = "server.configure")]
    ServerConfigure,
    /// World save registered.
    #[serde(rename = "world.create")]
    #[strum(serialize = "world.create")]
    WorldCreate,
    /// World save moved to another instance.
    #[serde(rename = "world.assign")]
    #[strum(serialize = "world.assign")]
    WorldAssign,
    /// World save lock released.
    #[serde(rename = "world.release")]
    #[strum(serialize = "world.release")]
    WorldRelease,
    /// World save removed.
    #[serde(rename = "world.delete")]
    #[strum(serialize = "world.delete")]
    WorldDelete,
    /// Console command executed.
    #[serde(rename = "console.exec")]
    #[strum(serialize = "console.exec")]
    ConsoleExec,
    /// Administrator registered.
    #[serde(rename = "admin.register")]
    #[strum(serialize = "admin.register")]
    AdminRegister,
    /// Administrator password rotated.
    #[serde(rename = "admin.rotate")]
    #[strum(serialize = "admin.rotate")]
    AdminRotate,
}

/// Whether the audited operation succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuditStatus {
    /// Operation completed.
    Success,
    /// Operation failed or was refused.
    Failure,
}

/// Unsealed audit event supplied by callers.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    /// Principal that requested the operation.
    pub actor: String,
    /// Operation performed.
    pub action: AuditAction,
    /// Kind of the target (`server`, `world`, `admin`).
    pub target_type: String,
    /// Name of the target.
    pub target_name: String,
    /// Outcome of the operation.
    pub status: AuditStatus,
    /// Failure description, when `status` is `Failure`.
    pub error_message: Option<String>,
    /// Additional context.
    pub details: serde_json::Value,
}

impl AuditRecord {
    /// Successful operation against `target_type`/`target_name`.
    pub fn success(
        actor: impl Into<String>,
        action: AuditAction,
        target_type: &str,
        target_name: &str,
    ) -> Self {
        Self {
            actor: actor.into(),
            action,
            target_type: target_type.to_owned(),
            target_name: target_name.to_owned(),
            status: AuditStatus::Success,
            error_message: None,
            details: serde_json::Value::Null,
        }
    }

    /// Failed operation with its error description.
    pub fn failure(
        actor: impl Into<String>,
        action: AuditAction,
        target_type: &str,
        target_name: &str,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: AuditStatus::Failure,
            error_message: Some(error.into()),
            ..Self::success(actor, action, target_type, target_name)
        }
    }

    /// Attach context details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Entry recorded in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// Unique entry identifier.
    pub id: Uuid,
    /// Timestamp when the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Actor responsible for the event.
    pub actor: String,
    /// Operation performed.
    pub action: AuditAction,
    /// Kind of the target.
    pub target_type: String,
    /// Name of the target.
    pub target_name: String,
    /// Outcome of the operation.
    pub status: AuditStatus,
    /// Failure description.
    pub error_message: Option<String>,
    /// Additional context serialized as JSON.
    pub details: serde_json::Value,
    /// SHA-256 hash of the entry contents and previous hash.
    pub hash: String,
    /// Hash of the previous entry (or zero string for the first entry).
    pub previous_hash: String,
}

impl AuditEntry {
    fn compute_hash(
        id: &Uuid,
        timestamp: DateTime<Utc>,
        record: &AuditRecord,
        previous_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hasher.update(
            timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        let action = record.action.to_string();
        let status = record.status.to_string();
        for field in [
            record.actor.as_str(),
            action.as_str(),
            record.target_type.as_str(),
            record.target_name.as_str(),
            status.as_str(),
            record.error_message.as_deref().unwrap_or(""),
        ] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(record.details.to_string().as_bytes());
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn record(&self) -> AuditRecord {
        AuditRecord {
            actor: self.actor.clone(),
            action: self.action,
            target_type: self.target_type.clone(),
            target_name: self.target_name.clone(),
            status: self.status,
            error_message: self.error_message.clone(),
            details: self.details.clone(),
        }
    }
}

/// Criteria for [`AuditLog::query`]. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only this action.
    pub action: Option<AuditAction>,
    /// Only this target name.
    pub target_name: Option<String>,
    /// Only this outcome.
    pub status: Option<AuditStatus>,
    /// Keep at most this many of the newest matches.
    pub limit: Option<usize>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.action.map_or(true, |action| entry.action == action)
            && self
                .target_name
                .as_deref()
                .map_or(true, |name| entry.target_name == name)
            && self.status.map_or(true, |status| entry.status == status)
    }
}

/// Audit log backed by a newline-delimited JSON file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    last_hash: String,
}

impl AuditLog {
    /// Open an audit log at the given path. Existing entries are loaded to determine the head hash.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut log = Self {
            path: path.clone(),
            last_hash: "0".repeat(GENESIS_HASH_LEN),
        };
        if let Some(last) = log.entries()?.pop() {
            log.last_hash = last.hash;
        }
        Ok(log)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seal and append a record.
    ///
    /// The head hash is re-read from the file first, since other processes may
    /// have appended since this handle last wrote.
    pub fn append(&mut self, record: AuditRecord) -> Result<AuditEntry> {
        if let Some(last) = self.entries()?.pop() {
            self.last_hash = last.hash;
        }
        let id = Uuid::new_v4();
        let timestamp = Utc::now();
        let hash = AuditEntry::compute_hash(&id, timestamp, &record, &self.last_hash);
        let entry = AuditEntry {
            id,
            timestamp,
            actor: record.actor,
            action: record.action,
            target_type: record.target_type,
            target_name: record.target_name,
            status: record.status,
            error_message: record.error_message,
            details: record.details,
            hash: hash.clone(),
            previous_hash: self.last_hash.clone(),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("unable to create audit directory {}", parent.display())
                })?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("unable to open audit log {}", self.path.display()))?;
        file.write_all(serde_json::to_string(&entry)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        self.last_hash = hash;
        Ok(entry)
    }

    /// Every entry in append order.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for line in BufReader::new(fs::File::open(&self.path)?).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str::<AuditEntry>(&line)?);
        }
        Ok(entries)
    }

    /// Entries matching `filter`, oldest first.
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let mut matched: Vec<AuditEntry> = self
            .entries()?
            .into_iter()
            .filter(|entry| filter.matches(entry))
            .collect();
        if let Some(limit) = filter.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        Ok(matched)
    }

    /// Verify integrity of the log (detect tampering).
    pub fn verify(&self) -> Result<bool> {
        let mut previous = "0".repeat(GENESIS_HASH_LEN);
        for entry in self.entries()? {
            if entry.previous_hash != previous {
                return Ok(false);
            }
            let expected =
                AuditEntry::compute_hash(&entry.id, entry.timestamp, &entry.record(), &previous);
            if expected != entry.hash {
                return Ok(false);
            }
            previous = entry.hash;
        }
        Ok(true)
    }
}

/// Shared handle for concurrent appenders.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    inner: Arc<Mutex<AuditLog>>,
}

impl AuditTrail {
    /// Open the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from(AuditLog::new(path)?))
    }

    /// Append one record. Appends from all clones are serialized.
    pub fn record(&self, record: AuditRecord) -> Result<AuditEntry> {
        self.inner.lock().append(record)
    }

    /// Entries matching `filter`.
    pub fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        self.inner.lock().query(filter)
    }

    /// Verify the hash chain.
    pub fn verify(&self) -> Result<bool> {
        self.inner.lock().verify()
    }
}

impl From<AuditLog> for AuditTrail {
    fn from(log: AuditLog) -> Self {
        Self {
            inner: Arc::new(Mutex::new(log)),
        }
    }
}
