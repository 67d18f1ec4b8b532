use crate::layout::StoreLayout;
use crate::record::Record;
use crate::repository::{ensure_id, ensure_scoped, Repository};
use crate::{fsync_dir, StoreError};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use stackyard_schema::RecordId;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::warn;

const SEQUENCE_FILE: &str = ".sequence";
const SEQUENCE_LOCK: &str = ".sequence.lock";

/// On-disk form of a record: the record plus a blake3 checksum over its
/// pretty-printed JSON.
#[derive(Serialize, Deserialize)]
struct Stored<T> {
    record: T,
    checksum: String,
}

fn compute_checksum<T: Serialize>(record: &T) -> Result<String, StoreError> {
    let json = serde_json::to_string_pretty(record)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// Repository storing one JSON file per record under
/// `store/records/<kind>/<id>.json`.
///
/// Writes go through a temp file and an atomic rename. Id allocation is
/// serialized across processes with an advisory lock on the kind directory.
pub struct JsonRepository<T: Record> {
    layout: StoreLayout,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> JsonRepository<T> {
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            layout,
            _record: PhantomData,
        }
    }

    fn dir(&self) -> PathBuf {
        self.layout.record_kind_dir(T::KIND)
    }

    fn record_path(&self, id: RecordId) -> PathBuf {
        self.dir().join(format!("{id}.json"))
    }

    fn write(&self, record: &T) -> Result<(), StoreError> {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;
        let stored = Stored {
            checksum: compute_checksum(record)?,
            record,
        };
        let content = serde_json::to_string_pretty(&stored)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.record_path(record.id()))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }

    fn read(&self, path: &std::path::Path) -> Result<T, StoreError> {
        let content = fs::read_to_string(path)?;
        let stored: Stored<T> = serde_json::from_str(&content)?;
        let actual = compute_checksum(&stored.record)?;
        if actual != stored.checksum {
            return Err(StoreError::IntegrityFailure {
                record: format!("{}/{}", T::KIND, path.display()),
                expected: stored.checksum,
                actual,
            });
        }
        Ok(stored.record)
    }

    fn record_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && matches!(path.extension(), Some(e) if e == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    /// Every record of this kind. A corrupted file fails the whole query.
    fn list(&self) -> Result<Vec<T>, StoreError> {
        let mut results = self
            .record_files()?
            .iter()
            .map(|path| self.read(path))
            .collect::<Result<Vec<_>, _>>()?;
        results.sort_by_key(|r| r.id());
        Ok(results)
    }

    /// Highest id among the record files on disk, or 0 when there are none.
    fn max_stored_id(&self) -> Result<u64, StoreError> {
        Ok(self
            .record_files()?
            .iter()
            .filter_map(|p| p.file_stem()?.to_str()?.parse::<u64>().ok())
            .max()
            .unwrap_or(0))
    }

    fn next_id(&self) -> Result<RecordId, StoreError> {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dir.join(SEQUENCE_LOCK))?;
        lock.lock_exclusive()
            .map_err(|e| StoreError::LockFailed(format!("{} sequence: {e}", T::KIND)))?;

        let seq_path = dir.join(SEQUENCE_FILE);
        let recorded = match fs::read_to_string(&seq_path) {
            Ok(s) => match s.trim().parse::<u64>() {
                Ok(n) => n,
                Err(e) => {
                    warn!("unreadable {} sequence '{}': {e}", T::KIND, s.trim());
                    0
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        // Never hand out an id that already has a file.
        let next = recorded.max(self.max_stored_id()?) + 1;
        fs::write(&seq_path, next.to_string())?;

        lock.unlock()
            .map_err(|e| StoreError::LockFailed(format!("{} sequence: {e}", T::KIND)))?;
        Ok(RecordId::new(next))
    }
}

impl<T: Record> Repository<T> for JsonRepository<T> {
    fn get_by(&self, filters: &[T::Filter]) -> Result<Vec<T>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|r| r.matches_all(filters))
            .collect())
    }

    fn list_readable(&self) -> Result<Vec<T>, StoreError> {
        let mut results = Vec::new();
        for path in self.record_files()? {
            match self.read(&path) {
                Ok(record) => results.push(record),
                Err(e) => {
                    warn!("skipping corrupted {} entry '{}': {e}", T::KIND, path.display());
                }
            }
        }
        results.sort_by_key(|r| r.id());
        Ok(results)
    }

    fn create(&self, record: &mut T) -> Result<(), StoreError> {
        let id = self.next_id()?;
        let mut staged = record.clone();
        staged.set_id(id);
        self.write(&staged)?;
        *record = staged;
        Ok(())
    }

    fn save(&self, record: &T) -> Result<(), StoreError> {
        ensure_id(record)?;
        self.write(record)
    }

    fn delete_by(&self, filters: &[T::Filter]) -> Result<usize, StoreError> {
        ensure_scoped::<T>(filters)?;
        let mut removed = 0;
        for record in self.get_by(filters)? {
            let path = self.record_path(record.id());
            if path.exists() {
                fs::remove_file(path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
