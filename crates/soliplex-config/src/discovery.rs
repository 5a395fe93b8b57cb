//! YAML document loading and multi-path discovery.
//!
//! A search root is either a single config unit (it holds `<filename>`
//! itself) or a container whose immediate subdirectories each hold one.
//! Callers merging several roots keep the first document seen for any id.

use std::path::{Component, Path, PathBuf};

use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::{ConfigError, Result};

/// File name of the installation root document.
pub const INSTALLATION_FILE: &str = "installation.yaml";

/// File name of a room document.
pub const ROOM_CONFIG_FILE: &str = "room_config.yaml";

/// File name of a completion document.
pub const COMPLETION_CONFIG_FILE: &str = "completion_config.yaml";

/// File name of an OIDC auth-systems document.
pub const OIDC_CONFIG_FILE: &str = "config.yaml";

/// Load a YAML file which must contain a mapping at the top level.
pub fn load_config_yaml(path: &Path) -> Result<Mapping> {
    if !path.is_file() {
        return Err(ConfigError::NoSuchConfig {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;

    let value: Value = serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
        path: path.display().to_string(),
        source: e,
    })?;

    match value {
        Value::Mapping(mapping) => Ok(mapping),
        _ => Err(ConfigError::NotAMapping {
            path: path.display().to_string(),
        }),
    }
}

/// Find every `filename` document under `root`, in deterministic order.
///
/// If `root/filename` exists, only that document is returned. Otherwise each
/// immediate subdirectory (sorted by name) holding `filename` contributes one
/// document. A missing root yields nothing.
pub fn find_configs(root: &Path, filename: &str) -> Result<Vec<(PathBuf, Mapping)>> {
    let own = root.join(filename);
    if own.is_file() {
        debug!(path = %own.display(), "found single config");
        let mapping = load_config_yaml(&own)?;
        return Ok(vec![(own, mapping)]);
    }

    if !root.is_dir() {
        debug!(root = %root.display(), "search root missing, skipping");
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(root).map_err(|e| ConfigError::ReadFile {
        path: root.display().to_string(),
        source: e,
    })?;

    let mut subdirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    subdirs.sort();

    let mut found = Vec::new();
    for sub in subdirs {
        let candidate = sub.join(filename);
        if candidate.is_file() {
            debug!(path = %candidate.display(), "found config");
            let mapping = load_config_yaml(&candidate)?;
            found.push((candidate, mapping));
        }
    }

    Ok(found)
}

/// Read the string `id` of a discovered document.
pub(crate) fn document_id(path: &Path, mapping: &Mapping) -> Result<String> {
    match mapping.get("id") {
        None | Some(Value::Null) => Err(ConfigError::missing(path, "id")),
        Some(id) => serde_yaml::from_value(id.clone())
            .map_err(|e| ConfigError::invalid(path, "document id", e)),
    }
}

/// Directory holding a config document, used to resolve relative references.
pub(crate) fn config_dir(config_path: &Path) -> &Path {
    config_path.parent().unwrap_or_else(|| Path::new("."))
}

/// Make `path` absolute and remove `.` / `..` components without touching
/// the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
