//! Resource binding descriptors decoded from install parameters.

use crate::params::{ParamKind, ResolvedParams};
use crate::types::ServiceName;
use crate::SchemaError;
use serde::{Deserialize, Serialize};

/// Service name of the install hosting the database.
pub const DB_HOST_KEY: &str = "PANEL_DB_HOST";
pub const DB_NAME_KEY: &str = "PANEL_DB_NAME";
pub const DB_USER_KEY: &str = "PANEL_DB_USER";
pub const DB_PASSWORD_KEY: &str = "PANEL_DB_USER_PASSWORD";
pub const ROOT_PASSWORD_KEY: &str = "PANEL_DB_ROOT_PASSWORD";

const BINDING_KEYS: [&str; 4] = [DB_HOST_KEY, DB_NAME_KEY, DB_USER_KEY, DB_PASSWORD_KEY];

/// A website's request for a database inside another install.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseBinding {
    pub service_name: ServiceName,
    pub db_name: String,
    pub db_user: String,
    pub password: String,
}

impl DatabaseBinding {
    /// Decode a binding from install parameters.
    ///
    /// Returns `Ok(None)` only when none of the binding keys are present.
    /// Any binding key present means a binding was requested, in which case
    /// all of them must be present as strings (empty strings included).
    pub fn from_params(params: &ResolvedParams) -> Result<Option<Self>, SchemaError> {
        let missing: Vec<String> = BINDING_KEYS
            .iter()
            .filter(|k| !params.contains_key(k))
            .map(|k| (*k).to_owned())
            .collect();
        if missing.len() == BINDING_KEYS.len() {
            return Ok(None);
        }
        if !missing.is_empty() {
            return Err(SchemaError::IncompleteBinding(missing));
        }

        Ok(Some(Self {
            service_name: ServiceName::new(string_param(params, DB_HOST_KEY)?),
            db_name: string_param(params, DB_NAME_KEY)?,
            db_user: string_param(params, DB_USER_KEY)?,
            password: string_param(params, DB_PASSWORD_KEY)?,
        }))
    }
}

/// Root credentials of an install that hosts resources for other installs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthParam {
    pub root_password: String,
}

impl AuthParam {
    pub fn from_params(params: &ResolvedParams) -> Result<Self, SchemaError> {
        if !params.contains_key(ROOT_PASSWORD_KEY) {
            return Err(SchemaError::MissingParam(ROOT_PASSWORD_KEY.to_owned()));
        }
        Ok(Self {
            root_password: string_param(params, ROOT_PASSWORD_KEY)?,
        })
    }
}

fn string_param(params: &ResolvedParams, key: &str) -> Result<String, SchemaError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| SchemaError::ParamTypeMismatch {
            key: key.to_owned(),
            expected: ParamKind::String,
        })
}
