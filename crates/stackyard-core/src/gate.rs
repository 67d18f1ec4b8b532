use stackyard_schema::{App, AppDetail, AppInstall, RecordId};
use stackyard_store::{AppDetailFilter, AppFilter, InstallFilter, Repository, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("app '{key}' allows at most {limit} install(s)")]
    LimitExceeded { key: String, limit: u32 },
    #[error("required app '{0}' is not in the catalog")]
    UnknownRequirement(String),
    #[error("required app '{0}' is not installed")]
    RequirementNotInstalled(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Decides whether one more install of an app is allowed.
pub struct InstallGate {
    apps: Arc<dyn Repository<App>>,
    details: Arc<dyn Repository<AppDetail>>,
    installs: Arc<dyn Repository<AppInstall>>,
}

impl InstallGate {
    pub fn new(
        apps: Arc<dyn Repository<App>>,
        details: Arc<dyn Repository<AppDetail>>,
        installs: Arc<dyn Repository<AppInstall>>,
    ) -> Self {
        Self {
            apps,
            details,
            installs,
        }
    }

    /// Reject the install when the app is at its install limit or when any
    /// app it requires has no install. Stops at the first failed check.
    pub fn check_install_allowed(&self, app: &App) -> Result<(), GateError> {
        if app.limit > 0 {
            let count = self.installs.count(&[InstallFilter::AppId(app.id)])?;
            debug!("app '{}' has {count} of {} installs", app.key, app.limit);
            if count >= app.limit as usize {
                return Err(GateError::LimitExceeded {
                    key: app.key.to_string(),
                    limit: app.limit,
                });
            }
        }

        for key in app.required_keys() {
            let required = self
                .apps
                .get_first(&[AppFilter::Key(key.into())])?
                .ok_or_else(|| GateError::UnknownRequirement(key.to_owned()))?;
            let detail_ids: Vec<RecordId> = self
                .details
                .get_by(&[AppDetailFilter::AppId(required.id)])?
                .into_iter()
                .map(|d| d.id)
                .collect();
            let satisfied = !detail_ids.is_empty()
                && self
                    .installs
                    .get_first(&[InstallFilter::DetailIdsIn(detail_ids)])?
                    .is_some();
            if !satisfied {
                return Err(GateError::RequirementNotInstalled(key.to_owned()));
            }
        }

        Ok(())
    }
}
