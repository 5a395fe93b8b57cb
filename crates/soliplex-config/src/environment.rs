//! Environment overlay resolution.
//!
//! Per declared key, the first of these that has a value wins:
//! the `.env` overlay, the declared value, the process environment.
//! Final values starting with `file:` are then replaced by an absolute path
//! relative to the installation file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde_yaml::Value;
use tracing::debug;

use crate::discovery::normalize_path;
use crate::{ConfigError, Result};

/// Prefix marking an environment value as a path relative to the config.
pub const FILE_PREFIX: &str = "file:";

/// Lookup into a process-like environment.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The real process environment.
pub fn process_env() -> EnvLookup {
    Arc::new(|key: &str| std::env::var(key).ok())
}

/// One declared environment key. `value: None` defers to `.env` or the
/// process environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentEntry {
    pub name: String,
    pub value: Option<String>,
}

impl EnvironmentEntry {
    pub fn new(name: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            name: name.into(),
            value: value.map(str::to_string),
        }
    }
}

/// Parse the `environment` section of an installation file.
///
/// Accepts a mapping (`KEY: value` or `KEY: null`) or a list whose items are
/// bare key names or `{name, value}` mappings. A repeated key keeps its first
/// position and its last value.
pub fn declared_from_yaml(config_path: &Path, value: Value) -> Result<Vec<EnvironmentEntry>> {
    let mut entries: Vec<EnvironmentEntry> = Vec::new();
    let mut push = |name: String, value: Option<String>| {
        if let Some(existing) = entries.iter_mut().find(|e| e.name == name) {
            existing.value = value;
        } else {
            entries.push(EnvironmentEntry { name, value });
        }
    };

    match value {
        Value::Null => {}
        Value::Mapping(mapping) => {
            for (key, value) in mapping {
                let name = scalar_string(config_path, &key)?
                    .ok_or_else(|| ConfigError::missing(config_path, "environment name"))?;
                push(name, scalar_string(config_path, &value)?);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                match item {
                    Value::String(name) => push(name, None),
                    Value::Mapping(mut mapping) => {
                        let name = match mapping.remove("name") {
                            Some(Value::String(name)) => name,
                            _ => return Err(ConfigError::missing(config_path, "name")),
                        };
                        let value = match mapping.remove("value") {
                            Some(value) => scalar_string(config_path, &value)?,
                            None => None,
                        };
                        push(name, value);
                    }
                    _ => return Err(ConfigError::missing(config_path, "name")),
                }
            }
        }
        other => {
            return Err(ConfigError::invalid(
                config_path,
                "environment",
                expected_error::<Vec<Value>>(other),
            ));
        }
    }

    Ok(entries)
}

/// Render a scalar YAML value as a string. `null` is "no value".
fn scalar_string(config_path: &Path, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(ConfigError::invalid(
            config_path,
            "environment value",
            expected_error::<String>(other.clone()),
        )),
    }
}

/// Produce serde's own "invalid type" error for a value of the wrong shape.
fn expected_error<T: serde::de::DeserializeOwned>(value: Value) -> serde_yaml::Error {
    match serde_yaml::from_value::<T>(value) {
        Err(e) => e,
        Ok(_) => serde::de::Error::custom("unexpected value"),
    }
}

/// Read a `.env` file. A missing file is an empty overlay.
pub fn load_dotenv(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.is_file() {
        return Ok(BTreeMap::new());
    }

    let dotenv_err = |e| ConfigError::DotEnv {
        path: path.display().to_string(),
        source: e,
    };

    let mut overlay = BTreeMap::new();
    for item in dotenvy::from_path_iter(path).map_err(dotenv_err)? {
        let (key, value) = item.map_err(dotenv_err)?;
        overlay.insert(key, value);
    }

    debug!(path = %path.display(), keys = overlay.len(), "loaded dotenv overlay");
    Ok(overlay)
}

/// Resolves declared environment entries relative to one config directory.
#[derive(Debug, Clone)]
pub struct EnvironmentResolver {
    config_dir: PathBuf,
}

impl EnvironmentResolver {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Resolve every declared entry, or fail listing every missing key.
    pub fn resolve(
        &self,
        declared: &[EnvironmentEntry],
        dotenv: &BTreeMap<String, String>,
        process_env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<BTreeMap<String, String>> {
        let mut values = Vec::with_capacity(declared.len());
        let mut missing = Vec::new();

        for entry in declared {
            let value = dotenv
                .get(&entry.name)
                .cloned()
                .or_else(|| entry.value.clone())
                .or_else(|| process_env(&entry.name));

            match value {
                Some(value) => values.push((entry.name.clone(), value)),
                None => missing.push(entry.name.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvVars { names: missing });
        }

        values
            .into_iter()
            .map(|(key, value)| {
                let value = self.resolve_file_prefix(&key, &value)?;
                Ok((key, value))
            })
            .collect()
    }

    /// Replace a `file:<relative>` value with its absolute path.
    ///
    /// Values without the prefix pass through, so re-resolving is a no-op.
    pub fn resolve_file_prefix(&self, key: &str, value: &str) -> Result<String> {
        let Some(relative) = value.strip_prefix(FILE_PREFIX) else {
            return Ok(value.to_string());
        };

        if relative.starts_with(FILE_PREFIX) {
            return Err(ConfigError::NestedFilePrefix {
                key: key.to_string(),
                value: value.to_string(),
            });
        }

        let resolved = normalize_path(&self.config_dir.join(relative));
        Ok(resolved.display().to_string())
    }
}
