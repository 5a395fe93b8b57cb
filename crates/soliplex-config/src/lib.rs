//! Installation configuration resolution for Soliplex.
//!
//! An installation is a tree of YAML documents rooted at `installation.yaml`:
//! - Secrets with ordered fallback sources (env var, file, subprocess, random)
//! - An environment overlay fed by `.env` and the process environment
//! - Rooms and completions discovered across several search paths, where the
//!   earliest path wins on a repeated id
//! - Tools, MCP toolsets and secret sources built through plugin registries
//!   that the installation's `meta` section can extend
//!
//! Nested configs never point back at the installation. Operations that need
//! secrets or environment values take a [`InstallationLookup`].

pub mod agent;
pub mod completion;
pub mod context;
pub mod discovery;
pub mod environment;
pub mod error;
pub mod installation;
pub mod mcp;
pub mod oidc;
pub mod quiz;
pub mod registry;
pub mod room;
pub mod secrets;
pub mod tools;

pub use agent::{AgentConfig, LlmProviderParams, ProviderType};
pub use completion::CompletionConfig;
pub use context::{BuildContext, InstallationLookup};
pub use discovery::{find_configs, load_config_yaml, normalize_path};
pub use environment::{EnvLookup, EnvironmentEntry, EnvironmentResolver, process_env};
pub use error::{ConfigError, Result};
pub use installation::{
    CompletionMap, InstallationConfig, InstallationLoader, RoomMap, load_installation,
};
pub use mcp::{McpToolKwargs, McpToolsetConfig, McpToolsetRegistration};
pub use oidc::{OAuthClientParams, OidcAuthSystemConfig};
pub use quiz::{QuizConfig, QuizQuestion, QuizQuestionType};
pub use registry::{InstallationMeta, MetaEntry, PluginCatalog, PluginRegistry, Plugins};
pub use room::RoomConfig;
pub use secrets::{
    SECRET_PREFIX, SecretConfig, SecretError, SecretResolver, SecretSource,
    SecretSourceRegistration, strip_secret_prefix,
};
pub use tools::{ToolBinding, ToolConfig, ToolRegistration, ToolRequires};
