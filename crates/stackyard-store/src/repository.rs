use crate::json::JsonRepository;
use crate::layout::StoreLayout;
use crate::memory::MemoryRepository;
use crate::record::Record;
use crate::StoreError;
use stackyard_schema::{App, AppDetail, AppInstall, AppInstallResource, Database};
use std::sync::Arc;

/// Keyed persistence for one kind of record.
///
/// Every query takes a slice of filters that must all match; an empty slice
/// matches every record. Results are ordered by id. A record that cannot be
/// read fails the query rather than being left out of it.
pub trait Repository<T: Record>: Send + Sync {
    fn get_by(&self, filters: &[T::Filter]) -> Result<Vec<T>, StoreError>;

    /// Assign a fresh id to `record` and persist it.
    fn create(&self, record: &mut T) -> Result<(), StoreError>;

    /// Persist `record` under its existing id, replacing any previous version.
    fn save(&self, record: &T) -> Result<(), StoreError>;

    /// Remove every record matching `filters` and return how many were removed.
    /// An empty filter slice is rejected instead of wiping the collection.
    fn delete_by(&self, filters: &[T::Filter]) -> Result<usize, StoreError>;

    fn get_first(&self, filters: &[T::Filter]) -> Result<Option<T>, StoreError> {
        Ok(self.get_by(filters)?.into_iter().next())
    }

    fn count(&self, filters: &[T::Filter]) -> Result<usize, StoreError> {
        Ok(self.get_by(filters)?.len())
    }

    /// Every record for display. Unlike the queries above, implementations
    /// may skip entries they cannot read instead of failing.
    fn list_readable(&self) -> Result<Vec<T>, StoreError> {
        self.get_by(&[])
    }
}

/// One repository per entity, shared by every component that needs them.
#[derive(Clone)]
pub struct Repositories {
    pub apps: Arc<dyn Repository<App>>,
    pub details: Arc<dyn Repository<AppDetail>>,
    pub installs: Arc<dyn Repository<AppInstall>>,
    pub databases: Arc<dyn Repository<Database>>,
    pub resources: Arc<dyn Repository<AppInstallResource>>,
}

impl Repositories {
    /// File-backed repositories rooted in `layout`.
    pub fn json(layout: &StoreLayout) -> Self {
        Self {
            apps: Arc::new(JsonRepository::<App>::new(layout.clone())),
            details: Arc::new(JsonRepository::<AppDetail>::new(layout.clone())),
            installs: Arc::new(JsonRepository::<AppInstall>::new(layout.clone())),
            databases: Arc::new(JsonRepository::<Database>::new(layout.clone())),
            resources: Arc::new(JsonRepository::<AppInstallResource>::new(layout.clone())),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            apps: Arc::new(MemoryRepository::<App>::new()),
            details: Arc::new(MemoryRepository::<AppDetail>::new()),
            installs: Arc::new(MemoryRepository::<AppInstall>::new()),
            databases: Arc::new(MemoryRepository::<Database>::new()),
            resources: Arc::new(MemoryRepository::<AppInstallResource>::new()),
        }
    }
}

pub(crate) fn ensure_scoped<T: Record>(filters: &[T::Filter]) -> Result<(), StoreError> {
    if filters.is_empty() {
        return Err(StoreError::UnscopedDelete(T::KIND));
    }
    Ok(())
}

pub(crate) fn ensure_id<T: Record>(record: &T) -> Result<(), StoreError> {
    if record.id().is_unset() {
        return Err(StoreError::UnsetId(T::KIND));
    }
    Ok(())
}
