use crate::types::{AppKey, RecordId};
use crate::SchemaError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Whether a catalog entry is present in the latest fetched definition set.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum CatalogStatus {
    #[default]
    Normal,
    TakenDown,
}

impl fmt::Display for CatalogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogStatus::Normal => write!(f, "normal"),
            CatalogStatus::TakenDown => write!(f, "taken-down"),
        }
    }
}

/// Kind of application. `Runtime` and `Website` declare resource bindings
/// through their install parameters; every other kind installs standalone.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Runtime,
    Website,
    Tool,
    #[default]
    #[serde(other)]
    Other,
}

impl AppType {
    pub fn declares_binding(self) -> bool {
        matches!(self, AppType::Runtime | AppType::Website)
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppType::Runtime => write!(f, "runtime"),
            AppType::Website => write!(f, "website"),
            AppType::Tool => write!(f, "tool"),
            AppType::Other => write!(f, "other"),
        }
    }
}

/// Persisted catalog entry for an installable application.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    #[serde(default)]
    pub id: RecordId,
    pub key: AppKey,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_desc: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, rename = "type")]
    pub app_type: AppType,
    #[serde(default)]
    pub cross_version_update: bool,
    /// Keys of apps that must have at least one install before this one.
    #[serde(default, deserialize_with = "required_keys")]
    pub required: Vec<String>,
    /// Maximum number of concurrent installs; `0` means unlimited.
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub status: CatalogStatus,
}

impl App {
    pub fn new(key: impl Into<AppKey>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Required capability keys with empty entries skipped.
    pub fn required_keys(&self) -> impl Iterator<Item = &str> {
        self.required
            .iter()
            .map(String::as_str)
            .filter(|k| !k.is_empty())
    }

    /// Overwrite every descriptive field with the fetched definition.
    pub fn apply_define(&mut self, define: &AppDefine) {
        self.key = define.key.clone();
        self.name.clone_from(&define.name);
        self.short_desc.clone_from(&define.short_desc);
        self.author.clone_from(&define.author);
        self.source.clone_from(&define.source);
        self.app_type = define.app_type;
        self.cross_version_update = define.cross_version_update;
        self.required.clone_from(&define.required);
        self.limit = define.limit;
    }
}

/// One published version of an [`App`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppDetail {
    #[serde(default)]
    pub id: RecordId,
    pub app_id: RecordId,
    pub version: String,
    #[serde(default)]
    pub status: CatalogStatus,
}

impl AppDetail {
    pub fn new(app_id: RecordId, version: impl Into<String>) -> Self {
        Self {
            id: RecordId::UNSET,
            app_id,
            version: version.into(),
            status: CatalogStatus::Normal,
        }
    }
}

/// An application as published by the catalog source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppDefine {
    pub key: AppKey,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub short_desc: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, rename = "type")]
    pub app_type: AppType,
    #[serde(default)]
    pub cross_version_update: bool,
    #[serde(default, deserialize_with = "required_keys")]
    pub required: Vec<String>,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub versions: Vec<String>,
}

/// Top-level document of a fetched catalog (`apps/list.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogList {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub apps: Vec<AppDefine>,
}

/// Required keys arrive either as a JSON array or as a JSON-encoded string
/// holding that array.
fn required_keys<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        List(Vec<String>),
        Encoded(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::List(keys) => Ok(keys),
        Repr::Encoded(s) if s.trim().is_empty() => Ok(Vec::new()),
        Repr::Encoded(s) => serde_json::from_str(&s).map_err(serde::de::Error::custom),
    }
}

pub fn parse_catalog_str(input: &str) -> Result<CatalogList, SchemaError> {
    let list: CatalogList = serde_json::from_str(input)?;
    for (idx, app) in list.apps.iter().enumerate() {
        if app.key.is_empty() {
            let label = if app.name.is_empty() {
                format!("#{idx}")
            } else {
                app.name.clone()
            };
            return Err(SchemaError::EmptyKey(label));
        }
    }
    Ok(list)
}

pub fn parse_catalog_file(path: impl AsRef<Path>) -> Result<CatalogList, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_catalog_str(&content)
}
