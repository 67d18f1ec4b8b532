use crate::concurrency::StoreLock;
use crate::CoreError;
use serde::Serialize;
use stackyard_schema::{parse_catalog_file, App, AppDefine, AppDetail, AppKey, CatalogStatus, RecordId};
use stackyard_store::{AppDetailFilter, Repositories, StoreLayout};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Merge fetched version strings into the existing details of one app.
///
/// Every existing detail starts out taken down; fetched versions are flipped
/// back to normal (keeping their id) or added as new details.
pub fn reconcile_versions(
    existing: Vec<AppDetail>,
    fetched: &[String],
) -> BTreeMap<String, AppDetail> {
    let mut details: BTreeMap<String, AppDetail> = existing
        .into_iter()
        .map(|mut d| {
            d.status = CatalogStatus::TakenDown;
            (d.version.clone(), d)
        })
        .collect();

    for version in fetched {
        details
            .entry(version.clone())
            .and_modify(|d| d.status = CatalogStatus::Normal)
            .or_insert_with(|| AppDetail::new(RecordId::UNSET, version.clone()));
    }
    details
}

/// Merge fetched app definitions into the existing catalog, keyed by app key.
///
/// Apps missing from `fetched` survive as taken down. Fetched apps get every
/// descriptive field from their definition and are marked normal.
pub fn reconcile_apps(existing: Vec<App>, fetched: &[AppDefine]) -> BTreeMap<AppKey, App> {
    let mut apps: BTreeMap<AppKey, App> = existing
        .into_iter()
        .map(|mut a| {
            a.status = CatalogStatus::TakenDown;
            (a.key.clone(), a)
        })
        .collect();

    for define in fetched {
        let app = apps
            .entry(define.key.clone())
            .or_insert_with(|| App::new(define.key.clone()));
        app.apply_define(define);
        app.status = CatalogStatus::Normal;
    }
    apps
}

/// Where fresh app definitions come from.
pub trait CatalogSource: Send + Sync {
    fn fetch(&self) -> Result<Vec<AppDefine>, CoreError>;
}

/// Reads `<resource_dir>/apps/list.json`.
pub struct DirectoryCatalogSource {
    resource_dir: PathBuf,
}

impl DirectoryCatalogSource {
    pub fn new(resource_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_dir: resource_dir.into(),
        }
    }

    pub fn list_path(&self) -> PathBuf {
        self.resource_dir.join("apps").join("list.json")
    }
}

impl CatalogSource for DirectoryCatalogSource {
    fn fetch(&self) -> Result<Vec<AppDefine>, CoreError> {
        let path = self.list_path();
        debug!("reading catalog from {}", path.display());
        Ok(parse_catalog_file(&path)?.apps)
    }
}

/// Counts from one catalog sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub apps_added: usize,
    pub apps_updated: usize,
    pub apps_taken_down: usize,
    pub versions_added: usize,
    pub versions_taken_down: usize,
}

/// Persists reconciled catalog state. Only one sync runs at a time per store.
pub struct CatalogReconciler {
    layout: StoreLayout,
    repos: Repositories,
}

impl CatalogReconciler {
    pub fn new(layout: StoreLayout, repos: Repositories) -> Self {
        Self { layout, repos }
    }

    pub fn sync(&self, source: &dyn CatalogSource) -> Result<SyncReport, CoreError> {
        let Some(_lock) = StoreLock::try_acquire(&self.layout.sync_lock())? else {
            return Err(CoreError::SyncInProgress);
        };

        let defines = source.fetch()?;
        info!("syncing catalog with {} app definition(s)", defines.len());

        let existing = self.repos.apps.get_by(&[])?;
        let merged = reconcile_apps(existing, &defines);
        let mut report = SyncReport::default();
        let mut app_ids = BTreeMap::new();

        for (key, mut app) in merged {
            if app.id.is_unset() {
                self.repos.apps.create(&mut app)?;
                report.apps_added += 1;
            } else {
                self.repos.apps.save(&app)?;
                match app.status {
                    CatalogStatus::Normal => report.apps_updated += 1,
                    CatalogStatus::TakenDown => report.apps_taken_down += 1,
                }
            }
            app_ids.insert(key, app.id);
        }

        // Versions of apps that vanished from the fetch are left as they were.
        for define in &defines {
            let Some(&app_id) = app_ids.get(&define.key) else {
                continue;
            };
            let existing = self
                .repos
                .details
                .get_by(&[AppDetailFilter::AppId(app_id)])?;
            for (_, mut detail) in reconcile_versions(existing, &define.versions) {
                if detail.id.is_unset() {
                    detail.app_id = app_id;
                    self.repos.details.create(&mut detail)?;
                    report.versions_added += 1;
                } else {
                    if detail.status == CatalogStatus::TakenDown {
                        report.versions_taken_down += 1;
                    }
                    self.repos.details.save(&detail)?;
                }
            }
        }

        info!(
            "catalog synced: {} new app(s), {} taken down, {} new version(s)",
            report.apps_added, report.apps_taken_down, report.versions_added
        );
        Ok(report)
    }
}
