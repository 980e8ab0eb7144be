//! Record store contract and in-memory implementation.

use super::merge::{diff_rows, ChangeSet, Rows};
use async_trait::async_trait;
use indirector_core::StoreError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

/// Durable storage of named rows per `(kind, key)` record.
///
/// A relational implementation maps a record to a parent row plus child rows;
/// the contract only requires that [`RecordStore::commit`] applies a whole
/// change set atomically or not at all.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Rows of one record, or `None` if the record does not exist.
    async fn load(&self, kind: &str, key: &str) -> Result<Option<Rows>, StoreError>;

    /// Keys of `kind` starting with `prefix`, in key order.
    async fn keys(&self, kind: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Apply `changes` to the record in one transaction, creating the record
    /// if it does not exist.
    async fn commit(&self, kind: &str, key: &str, changes: ChangeSet) -> Result<(), StoreError>;

    /// Reconcile the record with `submitted` in one transaction: diff against
    /// the rows stored at commit time and apply the difference. Returns the
    /// applied change set and the record as committed.
    async fn merge(
        &self,
        kind: &str,
        key: &str,
        submitted: Rows,
    ) -> Result<(ChangeSet, Rows), StoreError>;

    /// Delete a record, returning its rows.
    async fn remove(&self, kind: &str, key: &str) -> Result<Option<Rows>, StoreError>;
}

type RecordId = (String, String);

/// [`RecordStore`] over a map guarded by a single lock.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<RecordId, Rows>>,
    commits: AtomicU64,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful commits.
    pub fn commits(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<RecordId, Rows>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `changes` to the record under an already held write lock.
    fn apply_locked(
        &self,
        records: &mut BTreeMap<RecordId, Rows>,
        id: RecordId,
        changes: &ChangeSet,
    ) -> Result<Rows, StoreError> {
        // Work on a copy so a failed change set leaves the record untouched.
        let mut staged = records.get(&id).cloned().unwrap_or_default();
        changes
            .apply_to(&mut staged)
            .map_err(|row| StoreError::TransactionFailed {
                kind: id.0.clone(),
                key: id.1.clone(),
                reason: format!("change set does not fit stored row '{}'", row),
            })?;

        records.insert(id, staged.clone());
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(staged)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self, kind: &str, key: &str) -> Result<Option<Rows>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(&(kind.to_string(), key.to_string())).cloned())
    }

    async fn keys(&self, kind: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records
            .keys()
            .filter(|(k, key)| k == kind && key.starts_with(prefix))
            .map(|(_, key)| key.clone())
            .collect())
    }

    async fn commit(&self, kind: &str, key: &str, changes: ChangeSet) -> Result<(), StoreError> {
        let mut records = self.write();
        self.apply_locked(&mut records, (kind.to_string(), key.to_string()), &changes)?;
        Ok(())
    }

    async fn merge(
        &self,
        kind: &str,
        key: &str,
        submitted: Rows,
    ) -> Result<(ChangeSet, Rows), StoreError> {
        let id = (kind.to_string(), key.to_string());
        let mut records = self.write();
        let changes = match records.get(&id) {
            Some(stored) => diff_rows(stored, &submitted),
            None => diff_rows(&Rows::new(), &submitted),
        };
        let committed = self.apply_locked(&mut records, id, &changes)?;
        Ok((changes, committed))
    }

    async fn remove(&self, kind: &str, key: &str) -> Result<Option<Rows>, StoreError> {
        Ok(self.write().remove(&(kind.to_string(), key.to_string())))
    }
}
