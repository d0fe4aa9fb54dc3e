//! ---
//! mcctl_section: "03-persistence-logging"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "redb-backed embedded store implementing every repository."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
//! Each write runs in its own redb write transaction, so a crash leaves earlier
//! commits intact and the in-flight record absent.
//!
//! redb locks its file for as long as a `Database` handle lives. A file-backed
//! [`Store`] therefore opens the database for each operation and drops it
//! right after, so several mcctl processes can share one file. An operation
//! that finds the file held retries with backoff for up to the lock wait.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use redb::backends::InMemoryBackend;
use redb::{Database, DatabaseError, ReadableTable, TableDefinition, WriteTransaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{ServerInstance, StoredCredential, WorldSave};
use crate::repository::{Record, RecordStream, Repository};
use crate::{PersistenceError, Result};

/// Default bound on waiting for another process to release the file.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

const FIRST_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(250);

/// Table: meta
/// Key: record table name
/// Value: last insertion sequence handed out for that table
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Stored row: the record plus its insertion sequence.
#[derive(Serialize)]
struct RowRef<'a, R> {
    seq: u64,
    record: &'a R,
}

#[derive(Deserialize)]
struct Row<R> {
    seq: u64,
    record: R,
}

fn table<R: Record>() -> TableDefinition<'static, &'static str, &'static [u8]> {
    TableDefinition::new(R::TABLE)
}

fn storage<E: Into<redb::Error>>(err: E) -> PersistenceError {
    PersistenceError::Storage(err.into().to_string())
}

fn encode<R: Record>(seq: u64, record: &R) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&RowRef { seq, record })?)
}

fn decode<R: Record>(bytes: &[u8]) -> Result<Row<R>> {
    Ok(serde_json::from_slice(bytes)?)
}

fn next_sequence(txn: &WriteTransaction, table_name: &str) -> Result<u64> {
    let mut meta = txn.open_table(META).map_err(storage)?;
    let next = meta
        .get(table_name)
        .map_err(storage)?
        .map(|current| current.value())
        .unwrap_or(0)
        + 1;
    meta.insert(table_name, next).map_err(storage)?;
    Ok(next)
}

fn create_tables(db: &Database) -> Result<()> {
    let txn = db.begin_write().map_err(storage)?;
    {
        txn.open_table(META).map_err(storage)?;
        txn.open_table(table::<ServerInstance>()).map_err(storage)?;
        txn.open_table(table::<WorldSave>()).map_err(storage)?;
        txn.open_table(table::<StoredCredential>()).map_err(storage)?;
    }
    txn.commit().map_err(storage)?;
    Ok(())
}

/// Open the database file, retrying while another handle holds it.
fn open_file(path: &Path, lock_wait: Duration) -> Result<Database> {
    let started = Instant::now();
    let mut backoff = FIRST_BACKOFF;
    loop {
        match Database::create(path) {
            Ok(db) => return Ok(db),
            Err(DatabaseError::DatabaseAlreadyOpen) => {
                let waited = started.elapsed();
                if waited >= lock_wait {
                    return Err(PersistenceError::Busy {
                        path: path.to_path_buf(),
                        waited,
                    });
                }
                debug!(
                    path = %path.display(),
                    backoff_ms = backoff.as_millis() as u64,
                    "metadata store busy"
                );
                std::thread::sleep(backoff.min(lock_wait - waited));
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(err) => return Err(storage(err)),
        }
    }
}

enum Backing {
    File(PathBuf),
    Memory(Database),
}

/// Embedded store holding instances, world saves, and credentials.
///
/// Clone is cheap. Clones share the backing and take turns on it.
#[derive(Clone)]
pub struct Store {
    backing: Arc<Backing>,
    lock_wait: Duration,
    turn: Arc<Mutex<()>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Store");
        if let Backing::File(path) = self.backing.as_ref() {
            debug.field("path", path);
        }
        debug.field("lock_wait", &self.lock_wait).finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create the database file, creating parent directories as needed.
    ///
    /// The file is released again before this returns.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_lock_wait(path, DEFAULT_LOCK_WAIT)
    }

    /// [`Store::open`] with an explicit bound on waiting for other processes.
    pub fn open_with_lock_wait(path: impl AsRef<Path>, lock_wait: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!(path = %path.display(), "preparing metadata store");
        create_tables(&open_file(path, lock_wait)?)?;
        Ok(Self {
            backing: Arc::new(Backing::File(path.to_path_buf())),
            lock_wait,
            turn: Arc::new(Mutex::new(())),
        })
    }

    /// Volatile store for tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(storage)?;
        create_tables(&db)?;
        Ok(Self {
            backing: Arc::new(Backing::Memory(db)),
            lock_wait: Duration::ZERO,
            turn: Arc::new(Mutex::new(())),
        })
    }

    /// Run `op` against the database, holding the file only for its duration.
    fn with_db<T>(&self, op: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let _turn = self.turn.lock();
        match self.backing.as_ref() {
            Backing::Memory(db) => op(db),
            Backing::File(path) => {
                let db = open_file(path, self.lock_wait)?;
                op(&db)
            }
        }
    }
}

impl<R: Record> Repository<R> for Store {
    fn get(&self, id: &str) -> Result<Option<R>> {
        self.with_db(|db| {
            let txn = db.begin_read().map_err(storage)?;
            let table = txn.open_table(table::<R>()).map_err(storage)?;
            let row = match table.get(id).map_err(storage)? {
                Some(bytes) => Some(decode::<R>(bytes.value())?),
                None => None,
            };
            Ok(row.map(|row| row.record))
        })
    }

    fn list(&self) -> Result<RecordStream<R>> {
        let mut rows = self.with_db(|db| {
            let txn = db.begin_read().map_err(storage)?;
            let table = txn.open_table(table::<R>()).map_err(storage)?;
            let mut rows = Vec::new();
            for entry in table.iter().map_err(storage)? {
                let (_, bytes) = entry.map_err(storage)?;
                rows.push(decode::<R>(bytes.value())?);
            }
            Ok(rows)
        })?;
        rows.sort_by_key(|row| row.seq);
        Ok(RecordStream::new(
            rows.into_iter().map(|row| row.record).collect(),
        ))
    }

    fn create(&self, record: R) -> Result<R> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(storage)?;
            {
                let mut rows = txn.open_table(table::<R>()).map_err(storage)?;
                if rows.get(record.id()).map_err(storage)?.is_some() {
                    return Err(PersistenceError::DuplicateId {
                        kind: R::TABLE,
                        id: record.id().to_owned(),
                    });
                }
                let seq = next_sequence(&txn, R::TABLE)?;
                let bytes = encode(seq, &record)?;
                rows.insert(record.id(), bytes.as_slice())
                    .map_err(storage)?;
            }
            txn.commit().map_err(storage)
        })?;
        debug!(table = R::TABLE, id = record.id(), "record created");
        Ok(record)
    }

    fn update(&self, id: &str, patch: R::Patch) -> Result<R> {
        let updated = self.with_db(|db| {
            let txn = db.begin_write().map_err(storage)?;
            let updated = {
                let mut rows = txn.open_table(table::<R>()).map_err(storage)?;
                let row = match rows.get(id).map_err(storage)? {
                    Some(bytes) => decode::<R>(bytes.value())?,
                    None => {
                        return Err(PersistenceError::NotFound {
                            kind: R::TABLE,
                            id: id.to_owned(),
                        })
                    }
                };
                let mut record = row.record;
                record.apply(patch);
                let bytes = encode(row.seq, &record)?;
                rows.insert(id, bytes.as_slice()).map_err(storage)?;
                record
            };
            txn.commit().map_err(storage)?;
            Ok(updated)
        })?;
        debug!(table = R::TABLE, %id, "record updated");
        Ok(updated)
    }

    fn delete(&self, id: &str) -> Result<R> {
        let removed = self.with_db(|db| {
            let txn = db.begin_write().map_err(storage)?;
            let removed = {
                let mut rows = txn.open_table(table::<R>()).map_err(storage)?;
                let removed = match rows.remove(id).map_err(storage)? {
                    Some(bytes) => decode::<R>(bytes.value())?,
                    None => {
                        return Err(PersistenceError::NotFound {
                            kind: R::TABLE,
                            id: id.to_owned(),
                        })
                    }
                };
                removed.record
            };
            txn.commit().map_err(storage)?;
            Ok(removed)
        })?;
        debug!(table = R::TABLE, %id, "record deleted");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackendKind, ServerInstancePatch, WorldSavePatch};
    use crate::repository::{ServerRepository, WorldRepository};
    use chrono::Utc;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn instance(name: &str) -> ServerInstance {
        ServerInstance {
            name: name.to_owned(),
            backend: BackendKind::ShellManaged,
            config_ref: format!("servers/{name}/server.properties"),
            console: None,
            settings: Default::default(),
            created_at: Utc::now(),
        }
    }

    fn world(id: &str, parent: &str) -> WorldSave {
        WorldSave {
            id: id.to_owned(),
            instance: parent.to_owned(),
            location: PathBuf::from(format!("/srv/worlds/{id}")),
            size_bytes: 1024,
            last_modified: Utc::now(),
            locked_by: None,
        }
    }

    #[test]
    fn create_rejects_duplicates() {
        let store = Store::in_memory().unwrap();
        Repository::<ServerInstance>::create(&store, instance("survival-1")).unwrap();
        let err = Repository::<ServerInstance>::create(&store, instance("survival-1")).unwrap_err();
        assert!(matches!(err, PersistenceError::DuplicateId { kind: "instances", .. }));
    }

    #[test]
    fn list_preserves_insertion_order() {
        let store = Store::in_memory().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            Repository::<ServerInstance>::create(&store, instance(name)).unwrap();
        }
        let names: Vec<String> = Repository::<ServerInstance>::list(&store)
            .unwrap()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn update_keeps_position_and_applies_patch() {
        let store = Store::in_memory().unwrap();
        let repo: &dyn ServerRepository = &store;
        repo.create(instance("a")).unwrap();
        repo.create(instance("b")).unwrap();
        let updated = repo
            .update(
                "a",
                ServerInstancePatch {
                    config_ref: Some("elsewhere".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.config_ref, "elsewhere");
        let first = repo.list().unwrap().next().unwrap();
        assert_eq!(first.name, "a");
        assert_eq!(first.config_ref, "elsewhere");
    }

    #[test]
    fn update_and_delete_missing_report_not_found() {
        let store = Store::in_memory().unwrap();
        let repo: &dyn WorldRepository = &store;
        assert!(repo
            .update("ghost", WorldSavePatch::default())
            .unwrap_err()
            .is_not_found());
        assert!(repo.delete("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn worlds_do_not_validate_parents() {
        let store = Store::in_memory().unwrap();
        let repo: &dyn WorldRepository = &store;
        repo.create(world("lobby", "nobody")).unwrap();
        repo.create(world("nether", "survival-1")).unwrap();
        let orphans = repo.list_for_instance("nobody").unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].id, "lobby");
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("mcctl.redb");
        {
            let store = Store::open(&path).unwrap();
            Repository::<ServerInstance>::create(&store, instance("survival-1")).unwrap();
            Repository::<ServerInstance>::delete(&store, "survival-1").unwrap();
            Repository::<ServerInstance>::create(&store, instance("creative")).unwrap();
        }
        let store = Store::open(&path).unwrap();
        let repo: &dyn ServerRepository = &store;
        assert!(repo.get("survival-1").unwrap().is_none());
        assert_eq!(repo.get("creative").unwrap().unwrap().name, "creative");
    }

    #[test]
    fn two_handles_on_one_file_interleave() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mcctl.redb");
        let first = Store::open(&path).unwrap();
        let second = Store::open(&path).unwrap();
        let a: &dyn ServerRepository = &first;
        let b: &dyn ServerRepository = &second;
        a.create(instance("survival-1")).unwrap();
        assert!(b.get("survival-1").unwrap().is_some());
        b.create(instance("creative")).unwrap();
        let names: Vec<String> = a.list().unwrap().map(|i| i.name).collect();
        assert_eq!(names, vec!["survival-1", "creative"]);
    }

    #[test]
    fn waits_for_a_foreign_holder_then_proceeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mcctl.redb");
        let store = Store::open(&path).unwrap();
        let impatient = Store::open_with_lock_wait(&path, Duration::ZERO).unwrap();

        let holder = Database::create(&path).unwrap();
        let err = Repository::<ServerInstance>::get(&impatient, "x").unwrap_err();
        assert!(matches!(err, PersistenceError::Busy { .. }), "{err}");

        let release = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            drop(holder);
        });
        Repository::<ServerInstance>::create(&store, instance("lobby")).unwrap();
        release.join().unwrap();
        assert!(Repository::<ServerInstance>::get(&impatient, "lobby")
            .unwrap()
            .is_some());
    }
}
