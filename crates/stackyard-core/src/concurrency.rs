use crate::CoreError;
use fs2::FileExt;
use stackyard_schema::AppKey;
use stackyard_store::StoreLayout;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::debug;

/// Exclusive advisory lock on a file, released on drop.
pub struct StoreLock {
    lock_file: File,
}

fn open_lock_file(lock_path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

impl StoreLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        let file = open_lock_file(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| CoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;
        Ok(Self { lock_file: file })
    }

    /// Like [`StoreLock::acquire`] but returns `None` instead of waiting.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = open_lock_file(lock_path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

/// Serializes installs of the same app across processes.
///
/// The lock covers the limit check, the port check, file materialization and
/// the creation of the install row.
#[derive(Clone)]
pub struct KeyedLock {
    layout: StoreLayout,
}

impl KeyedLock {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn lock(&self, key: &AppKey) -> Result<StoreLock, CoreError> {
        let path = self.layout.install_lock(key.as_str());
        debug!("waiting for install lock {}", path.display());
        StoreLock::acquire(&path)
    }
}
