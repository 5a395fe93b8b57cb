//! Lookups that nested configs perform against their installation.
//!
//! Nested configs never hold a pointer to the root. Anything that needs a
//! secret, an environment value or the quiz search paths receives a
//! `&dyn InstallationLookup` for the duration of the call.

use std::path::{Path, PathBuf};

use crate::registry::Plugins;
use crate::secrets::SECRET_PREFIX;
use crate::Result;

/// Read-only view of an installation used while building and querying
/// nested configs.
pub trait InstallationLookup {
    /// Resolve a `secret:<name>` reference.
    fn get_secret(&self, secret_ref: &str) -> Result<String>;

    /// Configured value of an environment key, if any.
    fn get_environment(&self, key: &str) -> Option<String>;

    /// Directories searched for quiz question files, in order.
    fn quizzes_paths(&self) -> &[PathBuf];

    /// Replace every space-separated token containing `secret:` with the
    /// secret it names, e.g. `Bearer secret:API_TOKEN`.
    fn interpolate_secret(&self, value: &str) -> Result<String> {
        if !value.contains(SECRET_PREFIX) {
            return Ok(value.to_string());
        }

        let tokens = value
            .split(' ')
            .map(|token| {
                if token.contains(SECRET_PREFIX) {
                    self.get_secret(token)
                } else {
                    Ok(token.to_string())
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(tokens.join(" "))
    }
}

/// Everything a config builder needs: the lookup, the plugin registry, and
/// the document being built.
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub lookup: &'a dyn InstallationLookup,
    pub plugins: &'a Plugins,
    pub config_path: &'a Path,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        lookup: &'a dyn InstallationLookup,
        plugins: &'a Plugins,
        config_path: &'a Path,
    ) -> Self {
        Self {
            lookup,
            plugins,
            config_path,
        }
    }

    /// Directory of the document being built.
    pub fn config_dir(&self) -> &'a Path {
        crate::discovery::config_dir(self.config_path)
    }
}

impl std::fmt::Debug for BuildContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("config_path", &self.config_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory lookup for unit tests.

    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::InstallationLookup;
    use crate::secrets::strip_secret_prefix;
    use crate::{ConfigError, Result};

    #[derive(Debug, Default)]
    pub struct StaticLookup {
        pub secrets: BTreeMap<String, String>,
        pub environment: BTreeMap<String, String>,
        pub quizzes_paths: Vec<PathBuf>,
    }

    impl StaticLookup {
        pub fn with_secret(mut self, name: &str, value: &str) -> Self {
            self.secrets.insert(name.to_string(), value.to_string());
            self
        }

        pub fn with_env(mut self, key: &str, value: &str) -> Self {
            self.environment.insert(key.to_string(), value.to_string());
            self
        }

        pub fn with_quizzes_path(mut self, path: impl Into<PathBuf>) -> Self {
            self.quizzes_paths.push(path.into());
            self
        }
    }

    impl InstallationLookup for StaticLookup {
        fn get_secret(&self, secret_ref: &str) -> Result<String> {
            let name = strip_secret_prefix(secret_ref)?;
            self.secrets
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownSecret {
                    name: name.to_string(),
                })
        }

        fn get_environment(&self, key: &str) -> Option<String> {
            self.environment.get(key).cloned()
        }

        fn quizzes_paths(&self) -> &[PathBuf] {
            &self.quizzes_paths
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StaticLookup;
    use super::*;
    use crate::ConfigError;

    #[test]
    fn test_interpolate_secret_bearer() {
        let lookup = StaticLookup::default().with_secret("TOKEN", "abc123");
        assert_eq!(
            lookup.interpolate_secret("Bearer secret:TOKEN").unwrap(),
            "Bearer abc123"
        );
    }

    #[test]
    fn test_interpolate_secret_passthrough() {
        let lookup = StaticLookup::default();
        assert_eq!(
            lookup.interpolate_secret("application/json").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_interpolate_secret_unknown() {
        let lookup = StaticLookup::default();
        let err = lookup.interpolate_secret("Bearer secret:NOPE").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSecret { name } if name == "NOPE"));
    }
}
