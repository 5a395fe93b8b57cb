//! The installation root: loading, lookups and cached collections.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::agent::AgentConfig;
use crate::completion::CompletionConfig;
use crate::context::{BuildContext, InstallationLookup};
use crate::discovery::{
    COMPLETION_CONFIG_FILE, INSTALLATION_FILE, ROOM_CONFIG_FILE, document_id, find_configs,
    load_config_yaml, normalize_path,
};
use crate::environment::{
    EnvLookup, EnvironmentEntry, EnvironmentResolver, declared_from_yaml, load_dotenv, process_env,
};
use crate::oidc::{OidcAuthSystemConfig, load_oidc_auth_systems};
use crate::registry::{InstallationMeta, PluginCatalog, Plugins};
use crate::room::RoomConfig;
use crate::secrets::{SecretConfig, SecretResolver, strip_secret_prefix};
use crate::{ConfigError, Result};

/// Name of the dotenv overlay next to the installation file.
pub const DOTENV_FILE: &str = ".env";

/// Rooms keyed by id.
pub type RoomMap = BTreeMap<String, Arc<RoomConfig>>;

/// Completions keyed by id.
pub type CompletionMap = BTreeMap<String, Arc<CompletionConfig>>;

// ─────────────────────────────────────────────────────────────────────────────
// Loader
// ─────────────────────────────────────────────────────────────────────────────

/// Builds an [`InstallationConfig`] with a chosen plugin catalog and process
/// environment.
#[derive(Clone)]
pub struct InstallationLoader {
    catalog: PluginCatalog,
    env: EnvLookup,
}

impl std::fmt::Debug for InstallationLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationLoader")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl Default for InstallationLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl InstallationLoader {
    /// Built-in catalog, real process environment.
    pub fn new() -> Self {
        Self {
            catalog: PluginCatalog::builtin(),
            env: process_env(),
        }
    }

    pub fn with_catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the process environment seen by secret and environment
    /// resolution.
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Load an installation from a file, or from a directory holding
    /// `installation.yaml`.
    pub fn load(&self, path: &Path) -> Result<InstallationConfig> {
        let mut config_path = normalize_path(path);
        if config_path.is_dir() {
            config_path = config_path.join(INSTALLATION_FILE);
        }

        let mapping = load_config_yaml(&config_path)?;
        let installation = self.from_yaml(&config_path, Value::Mapping(mapping))?;
        info!(
            id = %installation.id,
            path = %config_path.display(),
            "loaded installation"
        );
        Ok(installation)
    }

    /// Build an installation from its parsed document.
    pub fn from_yaml(&self, config_path: &Path, value: Value) -> Result<InstallationConfig> {
        let parsed: InstallationYaml = serde_yaml::from_value(value)
            .map_err(|e| ConfigError::invalid(config_path, "installation config", e))?;

        let meta = parsed.meta.unwrap_or_default();
        let mut plugins = Plugins::builtin();
        plugins.apply_meta(&meta, &self.catalog)?;

        let secrets = parsed
            .secrets
            .into_iter()
            .map(|secret| SecretConfig::from_yaml(&plugins, config_path, secret))
            .collect::<Result<Vec<_>>>()?;

        let environment = match parsed.environment {
            Some(value) => declared_from_yaml(config_path, value)?,
            None => Vec::new(),
        };

        let parent = crate::discovery::config_dir(config_path);
        let paths = |declared: Option<Vec<Option<String>>>, default: &str| -> Vec<PathBuf> {
            declared
                .unwrap_or_else(|| vec![Some(default.to_string())])
                .into_iter()
                .flatten()
                .map(|path| normalize_path(&parent.join(path)))
                .collect()
        };

        let mut installation = InstallationConfig {
            id: parsed.id,
            meta,
            secrets,
            environment,
            resolved_environment: None,
            agent_configs: Vec::new(),
            oidc_paths: paths(parsed.oidc_paths, "./oidc"),
            room_paths: paths(parsed.room_paths, "./rooms"),
            completion_paths: paths(parsed.completion_paths, "./completions"),
            quizzes_paths: paths(parsed.quizzes_paths, "./quizzes"),
            config_path: config_path.to_path_buf(),
            plugins,
            secret_resolver: SecretResolver::new(Arc::clone(&self.env)),
            env: Arc::clone(&self.env),
            collections: RwLock::new(Collections::default()),
        };

        // Agents read environment defaults, so they are built against the
        // installation itself.
        let agent_configs = {
            let ctx = BuildContext::new(&installation, &installation.plugins, config_path);
            parsed
                .agent_configs
                .into_iter()
                .map(|agent| AgentConfig::from_yaml(&ctx, None, agent))
                .collect::<Result<Vec<_>>>()?
        };
        installation.agent_configs = agent_configs;

        Ok(installation)
    }
}

/// Load an installation with the built-in catalog and the real process
/// environment.
pub fn load_installation(path: &Path) -> Result<InstallationConfig> {
    InstallationLoader::new().load(path)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InstallationYaml {
    id: String,
    #[serde(default)]
    meta: Option<InstallationMeta>,
    #[serde(default)]
    secrets: Vec<Value>,
    #[serde(default)]
    environment: Option<Value>,
    #[serde(default)]
    agent_configs: Vec<Value>,
    #[serde(default)]
    oidc_paths: Option<Vec<Option<String>>>,
    #[serde(default)]
    room_paths: Option<Vec<Option<String>>>,
    #[serde(default)]
    completion_paths: Option<Vec<Option<String>>>,
    #[serde(default)]
    quizzes_paths: Option<Vec<Option<String>>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Installation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Collections {
    oidc: Option<Arc<Vec<OidcAuthSystemConfig>>>,
    rooms: Option<Arc<RoomMap>>,
    completions: Option<Arc<CompletionMap>>,
}

/// One deployment's resolved configuration.
///
/// Rooms, completions and OIDC systems are discovered on first access and
/// cached until [`InstallationConfig::reload_configurations`].
pub struct InstallationConfig {
    pub id: String,
    pub meta: InstallationMeta,
    pub secrets: Vec<SecretConfig>,
    environment: Vec<EnvironmentEntry>,
    resolved_environment: Option<BTreeMap<String, String>>,
    agent_configs: Vec<AgentConfig>,
    pub oidc_paths: Vec<PathBuf>,
    pub room_paths: Vec<PathBuf>,
    pub completion_paths: Vec<PathBuf>,
    pub quizzes_paths: Vec<PathBuf>,
    config_path: PathBuf,
    plugins: Plugins,
    secret_resolver: SecretResolver,
    env: EnvLookup,
    collections: RwLock<Collections>,
}

impl std::fmt::Debug for InstallationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationConfig")
            .field("id", &self.id)
            .field("config_path", &self.config_path)
            .field("room_paths", &self.room_paths)
            .field("completion_paths", &self.completion_paths)
            .finish_non_exhaustive()
    }
}

impl InstallationConfig {
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn plugins(&self) -> &Plugins {
        &self.plugins
    }

    // ── Secrets ─────────────────────────────────────────────────────────

    pub fn get_secret_config(&self, secret_name: &str) -> Option<&SecretConfig> {
        self.secrets.iter().find(|s| s.secret_name == secret_name)
    }

    /// Resolve every declared secret, caching each value. Fails listing every
    /// secret that could not be resolved.
    pub fn resolve_secrets(&self) -> Result<()> {
        self.secret_resolver.check_secrets(&self.secrets)?;
        debug!(count = self.secrets.len(), "resolved secrets");
        Ok(())
    }

    // ── Environment ─────────────────────────────────────────────────────

    /// Declared entries, before resolution.
    pub fn declared_environment(&self) -> &[EnvironmentEntry] {
        &self.environment
    }

    /// Resolved values, if [`Self::resolve_environment`] has succeeded.
    pub fn resolved_environment(&self) -> Option<&BTreeMap<String, String>> {
        self.resolved_environment.as_ref()
    }

    /// Resolve the declared environment against `.env` and the process
    /// environment. On failure the previous state is kept.
    pub fn resolve_environment(&mut self) -> Result<()> {
        let config_dir = crate::discovery::config_dir(&self.config_path);
        let dotenv = load_dotenv(&config_dir.join(DOTENV_FILE))?;
        let resolved = EnvironmentResolver::new(config_dir).resolve(
            &self.environment,
            &dotenv,
            &*self.env,
        )?;
        debug!(count = resolved.len(), "resolved environment");
        self.resolved_environment = Some(resolved);
        Ok(())
    }

    pub fn get_environment_or(&self, key: &str, default: &str) -> String {
        self.get_environment(key)
            .unwrap_or_else(|| default.to_string())
    }

    // ── Agents ──────────────────────────────────────────────────────────

    pub fn agent_configs(&self) -> &[AgentConfig] {
        &self.agent_configs
    }

    pub fn get_agent_config(&self, agent_id: &str) -> Result<&AgentConfig> {
        self.agent_configs
            .iter()
            .find(|agent| agent.id == agent_id)
            .ok_or_else(|| ConfigError::AgentNotFound(agent_id.to_string()))
    }

    // ── Cached collections ──────────────────────────────────────────────

    pub fn oidc_auth_system_configs(&self) -> Result<Arc<Vec<OidcAuthSystemConfig>>> {
        if let Some(oidc) = &self.collections.read().oidc {
            return Ok(Arc::clone(oidc));
        }
        let loaded = Arc::new(load_oidc_auth_systems(&self.oidc_paths)?);
        Ok(Arc::clone(
            self.collections.write().oidc.get_or_insert(loaded),
        ))
    }

    /// True when no OIDC auth systems are configured.
    pub fn auth_disabled(&self) -> Result<bool> {
        Ok(self.oidc_auth_system_configs()?.is_empty())
    }

    /// Rooms keyed by id. The map is a copy; the rooms are shared.
    pub fn room_configs(&self) -> Result<RoomMap> {
        if let Some(rooms) = &self.collections.read().rooms {
            return Ok(rooms.as_ref().clone());
        }
        let loaded = Arc::new(self.load_room_configs()?);
        let mut collections = self.collections.write();
        Ok(collections.rooms.get_or_insert(loaded).as_ref().clone())
    }

    /// Completions keyed by id. The map is a copy; the completions are shared.
    pub fn completion_configs(&self) -> Result<CompletionMap> {
        if let Some(completions) = &self.collections.read().completions {
            return Ok(completions.as_ref().clone());
        }
        let loaded = Arc::new(self.load_completion_configs()?);
        let mut collections = self.collections.write();
        Ok(collections.completions.get_or_insert(loaded).as_ref().clone())
    }

    pub fn get_room_config(&self, room_id: &str) -> Result<Arc<RoomConfig>> {
        self.room_configs()?
            .remove(room_id)
            .ok_or_else(|| ConfigError::RoomNotFound(room_id.to_string()))
    }

    pub fn get_completion_config(&self, completion_id: &str) -> Result<Arc<CompletionConfig>> {
        self.completion_configs()?
            .remove(completion_id)
            .ok_or_else(|| ConfigError::CompletionNotFound(completion_id.to_string()))
    }

    /// Rediscover rooms, completions and OIDC systems from disk.
    ///
    /// All three are loaded before any cache is replaced, so readers see
    /// either the old set or the new one. On error the old caches remain.
    pub fn reload_configurations(&self) -> Result<()> {
        let oidc = load_oidc_auth_systems(&self.oidc_paths)?;
        let rooms = self.load_room_configs()?;
        let completions = self.load_completion_configs()?;

        info!(
            oidc = oidc.len(),
            rooms = rooms.len(),
            completions = completions.len(),
            "reloaded configurations"
        );

        *self.collections.write() = Collections {
            oidc: Some(Arc::new(oidc)),
            rooms: Some(Arc::new(rooms)),
            completions: Some(Arc::new(completions)),
        };
        Ok(())
    }

    fn load_room_configs(&self) -> Result<RoomMap> {
        self.load_by_id(&self.room_paths, ROOM_CONFIG_FILE, |ctx, mapping| {
            RoomConfig::from_yaml(ctx, mapping).map(Arc::new)
        })
    }

    fn load_completion_configs(&self) -> Result<CompletionMap> {
        self.load_by_id(&self.completion_paths, COMPLETION_CONFIG_FILE, |ctx, mapping| {
            CompletionConfig::from_yaml(ctx, mapping).map(Arc::new)
        })
    }

    /// Discover documents under each root in order. The first document seen
    /// for an id wins; later ones are skipped without being built.
    fn load_by_id<T>(
        &self,
        roots: &[PathBuf],
        filename: &str,
        build: impl Fn(&BuildContext<'_>, serde_yaml::Mapping) -> Result<T>,
    ) -> Result<BTreeMap<String, T>> {
        let mut found = BTreeMap::new();
        for root in roots {
            for (config_path, mapping) in find_configs(root, filename)? {
                let id = document_id(&config_path, &mapping)?;
                if found.contains_key(&id) {
                    warn!(
                        id = %id,
                        path = %config_path.display(),
                        "skipping config shadowed by an earlier path"
                    );
                    continue;
                }
                let ctx = BuildContext::new(self, &self.plugins, &config_path);
                found.insert(id, build(&ctx, mapping)?);
            }
        }
        Ok(found)
    }
}

impl InstallationLookup for InstallationConfig {
    fn get_secret(&self, secret_ref: &str) -> Result<String> {
        let name = strip_secret_prefix(secret_ref)?;
        let secret = self
            .get_secret_config(name)
            .ok_or_else(|| ConfigError::UnknownSecret {
                name: name.to_string(),
            })?;
        Ok(self.secret_resolver.resolve(secret)?)
    }

    fn get_environment(&self, key: &str) -> Option<String> {
        match &self.resolved_environment {
            Some(resolved) => resolved.get(key).cloned(),
            None => self
                .environment
                .iter()
                .find(|entry| entry.name == key)
                .and_then(|entry| entry.value.clone()),
        }
    }

    fn quizzes_paths(&self) -> &[PathBuf] {
        &self.quizzes_paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env_of(pairs: &[(&str, &str)]) -> EnvLookup {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(move |key: &str| map.get(key).cloned())
    }

    fn load(dir: &Path, yaml: &str, env: &[(&str, &str)]) -> Result<InstallationConfig> {
        std::fs::write(dir.join(INSTALLATION_FILE), yaml).unwrap();
        InstallationLoader::new().with_env(env_of(env)).load(dir)
    }

    fn write_room(dir: &Path, id: &str, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join(ROOM_CONFIG_FILE),
            format!("id: {id}\nname: {name}\ndescription: test\nagent: {{}}\n"),
        )
        .unwrap();
    }

    #[test]
    fn test_default_paths() {
        let dir = TempDir::new().unwrap();
        let installation = load(dir.path(), "id: test\n", &[]).unwrap();
        let root = normalize_path(dir.path());
        assert_eq!(installation.room_paths, vec![root.join("rooms")]);
        assert_eq!(installation.completion_paths, vec![root.join("completions")]);
        assert_eq!(installation.oidc_paths, vec![root.join("oidc")]);
        assert_eq!(installation.quizzes_paths, vec![root.join("quizzes")]);
        assert_eq!(installation.config_path(), root.join(INSTALLATION_FILE));
    }

    #[test]
    fn test_null_paths_dropped() {
        let dir = TempDir::new().unwrap();
        let installation = load(
            dir.path(),
            "id: test\nroom_paths: [./a, null, ../b]\noidc_paths: []\n",
            &[],
        )
        .unwrap();
        let root = normalize_path(dir.path());
        assert_eq!(
            installation.room_paths,
            vec![root.join("a"), root.parent().unwrap().join("b")]
        );
        assert!(installation.oidc_paths.is_empty());
        assert!(installation.auth_disabled().unwrap());
    }

    #[test]
    fn test_missing_installation_file() {
        let dir = TempDir::new().unwrap();
        let err = InstallationLoader::new().load(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NoSuchConfig { .. }));
    }

    #[test]
    fn test_unknown_top_level_key() {
        let dir = TempDir::new().unwrap();
        let err = load(dir.path(), "id: test\nroom: ./rooms\n", &[]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { .. }));
    }

    #[test]
    fn test_get_secret() {
        let dir = TempDir::new().unwrap();
        let installation = load(
            dir.path(),
            "id: test\nsecrets:\n  - API_TOKEN\n",
            &[("API_TOKEN", "tok")],
        )
        .unwrap();

        assert_eq!(installation.get_secret("secret:API_TOKEN").unwrap(), "tok");
        assert!(matches!(
            installation.get_secret("API_TOKEN"),
            Err(ConfigError::NotASecret { .. })
        ));
        assert!(matches!(
            installation.get_secret("secret:OTHER"),
            Err(ConfigError::UnknownSecret { .. })
        ));
        installation.resolve_secrets().unwrap();
        assert_eq!(
            installation.get_secret_config("API_TOKEN").unwrap().resolved(),
            Some("tok")
        );
    }

    #[test]
    fn test_environment_before_and_after_resolution() {
        let dir = TempDir::new().unwrap();
        let mut installation = load(
            dir.path(),
            "id: test\nenvironment:\n  LOG_DIR: file:logs\n  HOST: null\n",
            &[("HOST", "example.com")],
        )
        .unwrap();

        assert_eq!(installation.get_environment("LOG_DIR").as_deref(), Some("file:logs"));
        assert_eq!(installation.get_environment("HOST"), None);

        installation.resolve_environment().unwrap();
        assert_eq!(
            installation.get_environment("LOG_DIR"),
            Some(normalize_path(&dir.path().join("logs")).display().to_string())
        );
        assert_eq!(installation.get_environment_or("HOST", "x"), "example.com");
        assert_eq!(installation.get_environment_or("PORT", "8000"), "8000");
    }

    #[test]
    fn test_failed_environment_resolution_keeps_declared_state() {
        let dir = TempDir::new().unwrap();
        let mut installation =
            load(dir.path(), "id: test\nenvironment: [A, B]\n", &[("A", "1")]).unwrap();

        let err = installation.resolve_environment().unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVars { ref names } if names == &["B"]));
        assert!(installation.resolved_environment().is_none());
    }

    #[test]
    fn test_agent_configs() {
        let dir = TempDir::new().unwrap();
        let installation = load(
            dir.path(),
            "id: test\nenvironment:\n  DEFAULT_AGENT_MODEL: llama3\nagent_configs:\n  - id: helper\n",
            &[],
        )
        .unwrap();
        let agent = installation.get_agent_config("helper").unwrap();
        assert_eq!(agent.model_name.as_deref(), Some("llama3"));
        assert!(matches!(
            installation.get_agent_config("nope"),
            Err(ConfigError::AgentNotFound(_))
        ));
    }

    #[test]
    fn test_room_configs_are_cached_until_reload() {
        let dir = TempDir::new().unwrap();
        write_room(&dir.path().join("rooms/lobby"), "lobby", "Lobby");
        let installation = load(dir.path(), "id: test\n", &[]).unwrap();

        assert_eq!(installation.room_configs().unwrap()["lobby"].name, "Lobby");

        write_room(&dir.path().join("rooms/lobby"), "lobby", "Renamed");
        assert_eq!(installation.get_room_config("lobby").unwrap().name, "Lobby");

        installation.reload_configurations().unwrap();
        assert_eq!(installation.get_room_config("lobby").unwrap().name, "Renamed");
    }

    #[test]
    fn test_room_configs_returns_copy() {
        let dir = TempDir::new().unwrap();
        write_room(&dir.path().join("rooms/lobby"), "lobby", "Lobby");
        let installation = load(dir.path(), "id: test\n", &[]).unwrap();

        let mut rooms = installation.room_configs().unwrap();
        rooms.clear();
        assert_eq!(installation.room_configs().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_room_and_completion() {
        let dir = TempDir::new().unwrap();
        let installation = load(dir.path(), "id: test\n", &[]).unwrap();
        assert!(matches!(
            installation.get_room_config("nope"),
            Err(ConfigError::RoomNotFound(ref id)) if id == "nope"
        ));
        assert!(matches!(
            installation.get_completion_config("nope"),
            Err(ConfigError::CompletionNotFound(_))
        ));
    }

    #[test]
    fn test_failed_reload_keeps_previous_caches() {
        let dir = TempDir::new().unwrap();
        write_room(&dir.path().join("rooms/lobby"), "lobby", "Lobby");
        let installation = load(dir.path(), "id: test\n", &[]).unwrap();
        assert_eq!(installation.room_configs().unwrap().len(), 1);

        std::fs::write(dir.path().join("rooms/lobby").join(ROOM_CONFIG_FILE), "- not a mapping\n")
            .unwrap();
        assert!(installation.reload_configurations().is_err());
        assert_eq!(installation.get_room_config("lobby").unwrap().name, "Lobby");
    }
}
