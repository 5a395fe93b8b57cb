//! Plugin registries for polymorphic config variants.
//!
//! One [`PluginRegistry`] type serves every discriminator space: tool names,
//! MCP toolset kinds, MCP tool wrappers and secret source kinds. Built-ins are
//! registered up front; an installation's `meta` section can register more by
//! naming entries of a [`PluginCatalog`]. Registration is last-write-wins.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::mcp::McpToolsetRegistration;
use crate::secrets::SecretSourceRegistration;
use crate::tools::{McpToolWrapper, SEARCH_DOCUMENTS_TOOL, ToolRegistration};
use crate::{ConfigError, Result};

/// Discriminator → entry mapping.
#[derive(Debug, Clone)]
pub struct PluginRegistry<T> {
    entries: BTreeMap<String, T>,
}

impl<T> Default for PluginRegistry<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> PluginRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry, returning the one it replaced.
    pub fn register(&mut self, key: impl Into<String>, entry: T) -> Option<T> {
        let key = key.into();
        let replaced = self.entries.insert(key.clone(), entry);
        if replaced.is_some() {
            debug!(key = %key, "replaced plugin registration");
        }
        replaced
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugins owned by one installation
// ─────────────────────────────────────────────────────────────────────────────

/// All registries used while building one installation.
#[derive(Debug, Clone, Default)]
pub struct Plugins {
    pub tools: PluginRegistry<ToolRegistration>,
    pub mcp_toolsets: PluginRegistry<McpToolsetRegistration>,
    pub mcp_tool_wrappers: PluginRegistry<McpToolWrapper>,
    pub secret_sources: PluginRegistry<SecretSourceRegistration>,
}

impl Plugins {
    /// Registries pre-populated with the built-in variants.
    pub fn builtin() -> Self {
        let mut plugins = Self::default();

        for tool in [
            ToolRegistration::search_documents(),
            ToolRegistration::get_current_datetime(),
        ] {
            plugins.tools.register(tool.tool_name.clone(), tool);
        }

        for toolset in [McpToolsetRegistration::stdio(), McpToolsetRegistration::http()] {
            plugins.mcp_toolsets.register(toolset.kind.clone(), toolset);
        }

        plugins
            .mcp_tool_wrappers
            .register(SEARCH_DOCUMENTS_TOOL, McpToolWrapper::WithQuery);

        for source in [
            SecretSourceRegistration::env_var(),
            SecretSourceRegistration::file_path(),
            SecretSourceRegistration::subprocess(),
            SecretSourceRegistration::random_chars(),
        ] {
            plugins.secret_sources.register(source.kind.clone(), source);
        }

        plugins
    }

    /// Registration for a tool name; unknown names get a bare registration.
    pub fn tool(&self, tool_name: &str) -> ToolRegistration {
        self.tools
            .get(tool_name)
            .cloned()
            .unwrap_or_else(|| ToolRegistration::bare(tool_name))
    }

    pub fn mcp_tool_wrapper(&self, tool_name: &str) -> Option<McpToolWrapper> {
        self.mcp_tool_wrappers.get(tool_name).copied()
    }

    pub fn mcp_toolset(&self, kind: &str, config_path: &Path) -> Result<&McpToolsetRegistration> {
        self.mcp_toolsets
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownMcpToolsetKind {
                kind: kind.to_string(),
                path: config_path.display().to_string(),
            })
    }

    pub fn secret_source(&self, kind: &str, secret_name: &str) -> Result<&SecretSourceRegistration> {
        self.secret_sources
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownSecretSourceKind {
                kind: kind.to_string(),
                secret_name: secret_name.to_string(),
            })
    }

    /// Register everything an installation's `meta` section names.
    pub fn apply_meta(&mut self, meta: &InstallationMeta, catalog: &PluginCatalog) -> Result<()> {
        for entry in &meta.tool_configs {
            let tool = catalog.tool(entry.config_klass())?.clone();
            debug!(tool_name = %tool.tool_name, "registering tool from meta");
            self.tools.register(tool.tool_name.clone(), tool);
        }

        for entry in &meta.mcp_toolset_configs {
            let toolset = catalog.mcp_toolset(entry.config_klass())?.clone();
            debug!(kind = %toolset.kind, "registering MCP toolset from meta");
            self.mcp_toolsets.register(toolset.kind.clone(), toolset);
        }

        for entry in &meta.mcp_server_tool_wrappers {
            let tool = catalog.tool(entry.config_klass())?;
            let wrapper_ref = entry.wrapper_klass().ok_or_else(|| ConfigError::MissingField {
                field: "wrapper_klass".to_string(),
                path: "meta.mcp_server_tool_wrappers".to_string(),
            })?;
            let wrapper = catalog.mcp_tool_wrapper(wrapper_ref)?;
            self.mcp_tool_wrappers.register(tool.tool_name.clone(), wrapper);
        }

        for entry in &meta.secret_sources {
            let source = catalog.secret_source(entry.config_klass())?.clone();
            if entry.registered_func().is_some() {
                warn!(
                    kind = %source.kind,
                    "ignoring 'registered_func' for secret source; resolution is built in"
                );
            }
            self.secret_sources.register(source.kind.clone(), source);
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Meta-configuration
// ─────────────────────────────────────────────────────────────────────────────

/// The `meta` section of an installation file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallationMeta {
    #[serde(default)]
    pub tool_configs: Vec<MetaEntry>,
    #[serde(default)]
    pub mcp_toolset_configs: Vec<MetaEntry>,
    #[serde(default)]
    pub mcp_server_tool_wrappers: Vec<MetaEntry>,
    #[serde(default)]
    pub secret_sources: Vec<MetaEntry>,
}

/// One `meta` entry: a catalog reference, or a mapping naming one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MetaEntry {
    Reference(String),
    Detailed {
        config_klass: String,
        #[serde(default)]
        wrapper_klass: Option<String>,
        #[serde(default)]
        registered_func: Option<String>,
    },
}

impl MetaEntry {
    pub fn config_klass(&self) -> &str {
        match self {
            MetaEntry::Reference(reference) => reference,
            MetaEntry::Detailed { config_klass, .. } => config_klass,
        }
    }

    pub fn wrapper_klass(&self) -> Option<&str> {
        match self {
            MetaEntry::Reference(_) => None,
            MetaEntry::Detailed { wrapper_klass, .. } => wrapper_klass.as_deref(),
        }
    }

    pub fn registered_func(&self) -> Option<&str> {
        match self {
            MetaEntry::Reference(_) => None,
            MetaEntry::Detailed {
                registered_func, ..
            } => registered_func.as_deref(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog of linked-in constructors
// ─────────────────────────────────────────────────────────────────────────────

/// Dotted references that `meta` entries may name, mapped to linked-in
/// registrations. Applications extend it before loading an installation.
#[derive(Debug, Clone)]
pub struct PluginCatalog {
    tools: BTreeMap<String, ToolRegistration>,
    mcp_toolsets: BTreeMap<String, McpToolsetRegistration>,
    mcp_tool_wrappers: BTreeMap<String, McpToolWrapper>,
    secret_sources: BTreeMap<String, SecretSourceRegistration>,
}

impl Default for PluginCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PluginCatalog {
    /// A catalog with no entries.
    pub fn empty() -> Self {
        Self {
            tools: BTreeMap::new(),
            mcp_toolsets: BTreeMap::new(),
            mcp_tool_wrappers: BTreeMap::new(),
            secret_sources: BTreeMap::new(),
        }
    }

    /// The references understood by every installation.
    pub fn builtin() -> Self {
        Self::empty()
            .with_tool(
                "soliplex.config.SearchDocumentsToolConfig",
                ToolRegistration::search_documents(),
            )
            .with_mcp_toolset(
                "soliplex.config.Stdio_MCP_ClientToolsetConfig",
                McpToolsetRegistration::stdio(),
            )
            .with_mcp_toolset(
                "soliplex.config.HTTP_MCP_ClientToolsetConfig",
                McpToolsetRegistration::http(),
            )
            .with_mcp_tool_wrapper("soliplex.config.NoArgsMCPWrapper", McpToolWrapper::NoArgs)
            .with_mcp_tool_wrapper(
                "soliplex.config.WithQueryMCPWrapper",
                McpToolWrapper::WithQuery,
            )
            .with_secret_source(
                "soliplex.config.EnvVarSecretSource",
                SecretSourceRegistration::env_var(),
            )
            .with_secret_source(
                "soliplex.config.FilePathSecretSource",
                SecretSourceRegistration::file_path(),
            )
            .with_secret_source(
                "soliplex.config.SubprocessSecretSource",
                SecretSourceRegistration::subprocess(),
            )
            .with_secret_source(
                "soliplex.config.RandomCharsSecretSource",
                SecretSourceRegistration::random_chars(),
            )
    }

    pub fn with_tool(mut self, reference: impl Into<String>, tool: ToolRegistration) -> Self {
        self.tools.insert(reference.into(), tool);
        self
    }

    pub fn with_mcp_toolset(
        mut self,
        reference: impl Into<String>,
        toolset: McpToolsetRegistration,
    ) -> Self {
        self.mcp_toolsets.insert(reference.into(), toolset);
        self
    }

    pub fn with_mcp_tool_wrapper(
        mut self,
        reference: impl Into<String>,
        wrapper: McpToolWrapper,
    ) -> Self {
        self.mcp_tool_wrappers.insert(reference.into(), wrapper);
        self
    }

    pub fn with_secret_source(
        mut self,
        reference: impl Into<String>,
        source: SecretSourceRegistration,
    ) -> Self {
        self.secret_sources.insert(reference.into(), source);
        self
    }

    fn tool(&self, reference: &str) -> Result<&ToolRegistration> {
        self.tools
            .get(reference)
            .ok_or_else(|| unknown("tool_configs", reference))
    }

    fn mcp_toolset(&self, reference: &str) -> Result<&McpToolsetRegistration> {
        self.mcp_toolsets
            .get(reference)
            .ok_or_else(|| unknown("mcp_toolset_configs", reference))
    }

    fn mcp_tool_wrapper(&self, reference: &str) -> Result<McpToolWrapper> {
        self.mcp_tool_wrappers
            .get(reference)
            .copied()
            .ok_or_else(|| unknown("mcp_server_tool_wrappers", reference))
    }

    fn secret_source(&self, reference: &str) -> Result<&SecretSourceRegistration> {
        self.secret_sources
            .get(reference)
            .ok_or_else(|| unknown("secret_sources", reference))
    }
}

fn unknown(section: &str, reference: &str) -> ConfigError {
    ConfigError::UnknownPlugin {
        section: section.to_string(),
        reference: reference.to_string(),
    }
}
