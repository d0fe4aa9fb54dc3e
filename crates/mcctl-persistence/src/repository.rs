//! ---
//! mcctl_section: "03-persistence-logging"
//! mcctl_subsection: "module"
//! mcctl_type: "source"
//! mcctl_scope: "code"
//! mcctl_description: "Repository capability traits."
//! mcctl_version: "v0.0.0-prealpha"
//! mcctl_owner: "tbd"
//! ---
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{ServerInstance, StoredCredential, WorldSave};
use crate::Result;

/// A keyed record that can live in a repository.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Partial update applied by [`Repository::update`].
    type Patch: Send;
    /// Table the record is stored in.
    const TABLE: &'static str;

    /// Primary key. Must not change under [`Record::apply`].
    fn id(&self) -> &str;

    /// Apply a patch in place.
    fn apply(&mut self, patch: Self::Patch);
}

/// Records from one `list()` call, in insertion order.
///
/// The stream is a snapshot taken when `list()` ran and is consumed once;
/// call `list()` again to iterate afresh.
#[derive(Debug)]
pub struct RecordStream<R> {
    inner: std::vec::IntoIter<R>,
}

impl<R> RecordStream<R> {
    pub(crate) fn new(records: Vec<R>) -> Self {
        Self {
            inner: records.into_iter(),
        }
    }
}

impl<R> Iterator for RecordStream<R> {
    type Item = R;

    fn next(&mut self) -> Option<R> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<R> ExactSizeIterator for RecordStream<R> {}

/// CRUD over one record kind. No cross-entity validation happens here.
pub trait Repository<R: Record>: Send + Sync {
    /// Fetch a record by key.
    fn get(&self, id: &str) -> Result<Option<R>>;

    /// Snapshot of every record in insertion order.
    fn list(&self) -> Result<RecordStream<R>>;

    /// Insert a new record. Fails with `DuplicateId` when the key is taken.
    fn create(&self, record: R) -> Result<R>;

    /// Patch an existing record. Fails with `NotFound` when absent.
    fn update(&self, id: &str, patch: R::Patch) -> Result<R>;

    /// Remove a record, returning it. Fails with `NotFound` when absent.
    fn delete(&self, id: &str) -> Result<R>;
}

/// Repository of [`ServerInstance`] records.
pub trait ServerRepository: Repository<ServerInstance> {}

impl<T: Repository<ServerInstance> + ?Sized> ServerRepository for T {}

/// Repository of [`WorldSave`] records.
pub trait WorldRepository: Repository<WorldSave> {
    /// Worlds whose parent is `instance`, in insertion order.
    fn list_for_instance(&self, instance: &str) -> Result<Vec<WorldSave>> {
        Ok(self
            .list()?
            .filter(|world| world.instance == instance)
            .collect())
    }
}

impl<T: Repository<WorldSave> + ?Sized> WorldRepository for T {}

/// Repository of [`StoredCredential`] records keyed by username.
pub trait CredentialRepository: Repository<StoredCredential> {}

impl<T: Repository<StoredCredential> + ?Sized> CredentialRepository for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_is_consumed_once() {
        let mut stream = RecordStream::new(vec![1, 2, 3]);
        assert_eq!(stream.len(), 3);
        assert_eq!(stream.by_ref().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(stream.next(), None);
    }
}
