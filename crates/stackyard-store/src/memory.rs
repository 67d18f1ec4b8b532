use crate::record::Record;
use crate::repository::{ensure_id, ensure_scoped, Repository};
use crate::StoreError;
use stackyard_schema::RecordId;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

struct Inner<T> {
    next_id: u64,
    records: BTreeMap<RecordId, T>,
}

/// Process-local repository used by tests and dry runs.
///
/// Writes can be switched to fail so callers' error paths can be exercised.
pub struct MemoryRepository<T: Record> {
    inner: Mutex<Inner<T>>,
    fail_writes: AtomicBool,
}

impl<T: Record> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                records: BTreeMap::new(),
            }),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl<T: Record> MemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create`, `save`, and `delete_by` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<T>>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::LockFailed(format!("mutex poisoned: {e}")))
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "writes to {} are disabled",
                T::KIND
            )));
        }
        Ok(())
    }
}

impl<T: Record> Repository<T> for MemoryRepository<T> {
    fn get_by(&self, filters: &[T::Filter]) -> Result<Vec<T>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .values()
            .filter(|r| r.matches_all(filters))
            .cloned()
            .collect())
    }

    fn create(&self, record: &mut T) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.lock()?;
        let id = RecordId::new(inner.next_id);
        inner.next_id += 1;
        record.set_id(id);
        inner.records.insert(id, record.clone());
        Ok(())
    }

    fn save(&self, record: &T) -> Result<(), StoreError> {
        self.check_writable()?;
        ensure_id(record)?;
        let mut inner = self.lock()?;
        let id = record.id();
        if id.get() >= inner.next_id {
            inner.next_id = id.get() + 1;
        }
        inner.records.insert(id, record.clone());
        Ok(())
    }

    fn delete_by(&self, filters: &[T::Filter]) -> Result<usize, StoreError> {
        self.check_writable()?;
        ensure_scoped::<T>(filters)?;
        let mut inner = self.lock()?;
        let before = inner.records.len();
        inner.records.retain(|_, r| !r.matches_all(filters));
        Ok(before - inner.records.len())
    }
}
