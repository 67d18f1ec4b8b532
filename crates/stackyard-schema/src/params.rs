//! Declared install parameters and their validated, typed values.
//!
//! Every app version ships a `params.json` next to its compose template that
//! declares which keys an install accepts and their types. Raw JSON input is
//! checked against that declaration once, at the boundary; the rest of the
//! system only ever sees [`ResolvedParams`].

use crate::SchemaError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

pub const PARAMS_FILE: &str = "params.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::String => write!(f, "string"),
            ParamKind::Number => write!(f, "number"),
            ParamKind::Boolean => write!(f, "boolean"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParamField {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParamSchema {
    #[serde(default)]
    pub fields: Vec<ParamField>,
}

impl ParamSchema {
    /// Load `params.json` from a version template directory. A directory
    /// without one declares no parameters.
    pub fn load(template_dir: &Path) -> Result<Self, SchemaError> {
        let path = template_dir.join(PARAMS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn field(&self, key: &str) -> Option<&ParamField> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Validate raw install input against the declared fields.
    ///
    /// Undeclared keys and values of the wrong JSON type are rejected. `null`
    /// counts as not provided, so the field's default (if any) applies.
    pub fn resolve(&self, raw: &serde_json::Map<String, Value>) -> Result<ResolvedParams, SchemaError> {
        let mut resolved = ResolvedParams::default();

        for (key, value) in raw {
            let field = self
                .field(key)
                .ok_or_else(|| SchemaError::UnknownParam(key.clone()))?;
            if value.is_null() {
                continue;
            }
            resolved.insert(key.clone(), ParamValue::from_json(key, field.kind, value)?);
        }

        for field in &self.fields {
            if resolved.contains_key(&field.key) {
                continue;
            }
            match &field.default {
                Some(default) if !default.is_null() => {
                    let value = ParamValue::from_json(&field.key, field.kind, default)?;
                    resolved.insert(field.key.clone(), value);
                }
                _ if field.required => {
                    return Err(SchemaError::MissingParam(field.key.clone()));
                }
                _ => {}
            }
        }

        Ok(resolved)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl ParamValue {
    fn from_json(key: &str, kind: ParamKind, value: &Value) -> Result<Self, SchemaError> {
        let mismatch = || SchemaError::ParamTypeMismatch {
            key: key.to_owned(),
            expected: kind,
        };
        match (kind, value) {
            (ParamKind::String, Value::String(s)) => Ok(ParamValue::String(s.clone())),
            (ParamKind::Number, Value::Number(n)) => {
                n.as_f64().map(ParamValue::Number).ok_or_else(mismatch)
            }
            (ParamKind::Boolean, Value::Bool(b)) => Ok(ParamValue::Bool(*b)),
            _ => Err(mismatch()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text written into the `.env` file. Numbers use the shortest decimal
    /// form that round-trips (`3306`, `0.5`), never an exponent.
    pub fn render(&self) -> String {
        match self {
            ParamValue::String(s) => s.clone(),
            ParamValue::Number(n) => n.to_string(),
            ParamValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::String(s.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::String(s)
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// Parameters of an install after validation against its [`ParamSchema`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ResolvedParams(BTreeMap<String, ParamValue>);

impl ResolvedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Render every value into its `.env` text form.
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.render()))
            .collect()
    }
}
