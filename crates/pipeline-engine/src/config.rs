//! Configuration surface for processes, edges and pipelines
//!
//! A process declares its configuration keys through [`ConfigKey`]s in its
//! descriptor. The engine resolves the caller-supplied [`Config`] against
//! those declarations before `Process::configure` runs: defaults are filled
//! in, unknown keys are logged, and missing required keys are rejected.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// String key/value configuration handed to a process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse a value as `T`
    ///
    /// Fails with `MissingKey` when absent and `InvalidValue` when the
    /// string does not parse.
    pub fn value<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self
            .get_str(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))?;
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::invalid_value(key, raw, e.to_string()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Config {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = Config::new();
        for (key, value) in iter {
            config.set(key, value);
        }
        config
    }
}

/// Declaration of one configuration key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigKey {
    pub name: String,
    /// Informational type tag (e.g. "float", "string")
    pub type_tag: String,
    pub default: Option<String>,
    pub description: String,
    pub required: bool,
}

impl ConfigKey {
    /// Declare a key with a default value
    pub fn new(
        name: impl Into<String>,
        type_tag: impl Into<String>,
        default: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            default: Some(default.into()),
            description: description.into(),
            required: false,
        }
    }

    /// Declare a key that must be supplied by the caller
    pub fn required(
        name: impl Into<String>,
        type_tag: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            default: None,
            description: description.into(),
            required: true,
        }
    }
}

/// Merge supplied values with declared defaults
pub(crate) fn resolve(
    process: &str,
    keys: &[ConfigKey],
    supplied: &Config,
) -> Result<Config, ConfigError> {
    for key in supplied.keys() {
        if !keys.iter().any(|k| k.name == key) {
            log::warn!("Process '{}': unknown configuration key '{}'", process, key);
        }
    }

    let mut resolved = supplied.clone();
    for key in keys {
        if resolved.contains(&key.name) {
            continue;
        }
        match &key.default {
            Some(default) if !key.required => resolved.set(key.name.clone(), default),
            _ => return Err(ConfigError::MissingKey(key.name.clone())),
        }
    }

    Ok(resolved)
}

/// Per-edge settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeConfig {
    /// Queue capacity; `None` uses the pipeline default, `Some(0)` is unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<usize>,
}

impl EdgeConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
        }
    }
}

/// Pipeline-wide settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Capacity for edges that don't set their own; 0 is unbounded
    pub default_edge_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_edge_capacity: 16,
        }
    }
}
