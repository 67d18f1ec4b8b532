//! The [`Record`] contract tying each persisted entity to its filter type.
//!
//! Filters are per-entity predicates. Repositories take a slice of them and
//! return the records matching all of them.

use serde::de::DeserializeOwned;
use serde::Serialize;
use stackyard_schema::{
    App, AppDetail, AppInstall, AppInstallResource, AppKey, Database, RecordId, ServiceName,
};
use std::fmt::Debug;

pub trait Record: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Filter: Debug + Send + Sync;

    /// Directory name and log label for this kind of record.
    const KIND: &'static str;

    fn id(&self) -> RecordId;

    fn set_id(&mut self, id: RecordId);

    fn matches(&self, filter: &Self::Filter) -> bool;

    fn matches_all(&self, filters: &[Self::Filter]) -> bool {
        filters.iter().all(|f| self.matches(f))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppFilter {
    Id(RecordId),
    Key(AppKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppDetailFilter {
    Id(RecordId),
    AppId(RecordId),
    Version(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallFilter {
    Id(RecordId),
    AppId(RecordId),
    Name(String),
    ServiceName(ServiceName),
    DetailIdsIn(Vec<RecordId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseFilter {
    Id(RecordId),
    IdsIn(Vec<RecordId>),
    AppInstallId(RecordId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceFilter {
    Id(RecordId),
    ConsumerInstallId(RecordId),
    ResourceId(RecordId),
}

impl Record for App {
    type Filter = AppFilter;
    const KIND: &'static str = "apps";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn matches(&self, filter: &AppFilter) -> bool {
        match filter {
            AppFilter::Id(id) => self.id == *id,
            AppFilter::Key(key) => self.key == *key,
        }
    }
}

impl Record for AppDetail {
    type Filter = AppDetailFilter;
    const KIND: &'static str = "app_details";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn matches(&self, filter: &AppDetailFilter) -> bool {
        match filter {
            AppDetailFilter::Id(id) => self.id == *id,
            AppDetailFilter::AppId(app_id) => self.app_id == *app_id,
            AppDetailFilter::Version(version) => self.version == *version,
        }
    }
}

impl Record for AppInstall {
    type Filter = InstallFilter;
    const KIND: &'static str = "app_installs";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn matches(&self, filter: &InstallFilter) -> bool {
        match filter {
            InstallFilter::Id(id) => self.id == *id,
            InstallFilter::AppId(app_id) => self.app_id == *app_id,
            InstallFilter::Name(name) => self.name == *name,
            InstallFilter::ServiceName(service) => self.service_name == *service,
            InstallFilter::DetailIdsIn(ids) => ids.contains(&self.app_detail_id),
        }
    }
}

impl Record for Database {
    type Filter = DatabaseFilter;
    const KIND: &'static str = "databases";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn matches(&self, filter: &DatabaseFilter) -> bool {
        match filter {
            DatabaseFilter::Id(id) => self.id == *id,
            DatabaseFilter::IdsIn(ids) => ids.contains(&self.id),
            DatabaseFilter::AppInstallId(install_id) => self.app_install_id == *install_id,
        }
    }
}

impl Record for AppInstallResource {
    type Filter = ResourceFilter;
    const KIND: &'static str = "app_install_resources";

    fn id(&self) -> RecordId {
        self.id
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = id;
    }

    fn matches(&self, filter: &ResourceFilter) -> bool {
        match filter {
            ResourceFilter::Id(id) => self.id == *id,
            ResourceFilter::ConsumerInstallId(install_id) => {
                self.consumer_install_id == *install_id
            }
            ResourceFilter::ResourceId(resource_id) => self.resource_id == *resource_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_combine_conjunctively() {
        let mut detail = AppDetail::new(RecordId::new(1), "8.0");
        detail.id = RecordId::new(5);
        assert!(detail.matches_all(&[
            AppDetailFilter::AppId(RecordId::new(1)),
            AppDetailFilter::Version("8.0".to_owned()),
        ]));
        assert!(!detail.matches_all(&[
            AppDetailFilter::AppId(RecordId::new(1)),
            AppDetailFilter::Version("5.7".to_owned()),
        ]));
    }

    #[test]
    fn empty_filter_slice_matches_everything() {
        let app = App::new("mysql");
        assert!(app.matches_all(&[]));
    }

    #[test]
    fn detail_ids_in_filter() {
        let install = AppInstall {
            app_detail_id: RecordId::new(3),
            ..AppInstall::default()
        };
        assert!(install.matches(&InstallFilter::DetailIdsIn(vec![
            RecordId::new(2),
            RecordId::new(3)
        ])));
        assert!(!install.matches(&InstallFilter::DetailIdsIn(Vec::new())));
    }

    #[test]
    fn record_kinds_are_distinct() {
        let kinds = [
            App::KIND,
            AppDetail::KIND,
            AppInstall::KIND,
            Database::KIND,
            AppInstallResource::KIND,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
