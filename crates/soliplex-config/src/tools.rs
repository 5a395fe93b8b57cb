//! Tool configuration.
//!
//! Every tool entry names a dotted `tool_name`. The registry maps that name
//! to a [`ToolRegistration`] declaring the tool's capability requirement and
//! how to build its settings; unregistered names become bare tools.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::context::{BuildContext, InstallationLookup};
use crate::discovery::normalize_path;
use crate::{ConfigError, Result};

/// Built-in document search tool.
pub const SEARCH_DOCUMENTS_TOOL: &str = "soliplex.tools.search_documents";

/// Built-in clock tool.
pub const GET_CURRENT_DATETIME_TOOL: &str = "soliplex.tools.get_current_datetime";

/// Environment key holding the directory of RAG databases.
pub const RAG_LANCE_DB_PATH: &str = "RAG_LANCE_DB_PATH";

/// What a tool needs from the invoking layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolRequires {
    /// Plain invocation.
    Bare,
    /// Needs a request-scoped context injected.
    Context,
    /// Needs its own [`ToolConfig`] bound in.
    OwnConfig,
}

/// Adapter used when exposing a tool over MCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpToolWrapper {
    /// Tool takes no arguments besides its config.
    NoArgs,
    /// Tool takes a single `query` argument besides its config.
    WithQuery,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

/// Builds a [`ToolConfig`] from its YAML mapping.
pub type ToolBuilder = fn(&BuildContext<'_>, &ToolRegistration, Mapping) -> Result<ToolConfig>;

/// Registry entry for one tool name.
#[derive(Clone)]
pub struct ToolRegistration {
    pub tool_name: String,
    pub requires: ToolRequires,
    pub build: ToolBuilder,
}

impl std::fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("tool_name", &self.tool_name)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

impl ToolRegistration {
    pub fn new(tool_name: impl Into<String>, requires: ToolRequires, build: ToolBuilder) -> Self {
        Self {
            tool_name: tool_name.into(),
            requires,
            build,
        }
    }

    /// A tool with no settings beyond `allow_mcp`.
    pub fn bare(tool_name: impl Into<String>) -> Self {
        Self::new(tool_name, ToolRequires::Bare, build_plain)
    }

    /// A settings-free tool that needs a request context injected.
    pub fn with_context(tool_name: impl Into<String>) -> Self {
        Self::new(tool_name, ToolRequires::Context, build_plain)
    }

    pub fn search_documents() -> Self {
        Self::new(
            SEARCH_DOCUMENTS_TOOL,
            ToolRequires::OwnConfig,
            build_search_documents,
        )
    }

    pub fn get_current_datetime() -> Self {
        Self::bare(GET_CURRENT_DATETIME_TOOL)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config
// ─────────────────────────────────────────────────────────────────────────────

/// A configured tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolConfig {
    pub tool_name: String,
    pub allow_mcp: bool,
    pub requires: ToolRequires,
    pub mcp_wrapper: Option<McpToolWrapper>,
    pub settings: ToolSettings,
    /// Document that declared this tool.
    pub config_path: PathBuf,
}

/// Variant-specific tool settings.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolSettings {
    Bare,
    SearchDocuments(SearchDocumentsSettings),
}

/// How the invoking layer should call a tool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolBinding<'a> {
    Bare,
    InjectContext,
    /// Call with this config pre-bound; it is not part of the visible signature.
    WithConfig(&'a ToolConfig),
}

impl ToolConfig {
    /// Build a tool from one entry of a `tools` list.
    pub fn from_yaml(ctx: &BuildContext<'_>, mapping: Mapping) -> Result<Self> {
        let tool_name = match mapping.get("tool_name") {
            Some(Value::String(name)) => name.clone(),
            _ => return Err(ConfigError::missing(ctx.config_path, "tool_name")),
        };

        match tool_name.rsplit_once('.') {
            Some((module, kind)) if !module.is_empty() && !kind.is_empty() => {}
            _ => {
                return Err(ConfigError::InvalidToolName {
                    tool_name,
                    path: ctx.config_path.display().to_string(),
                });
            }
        }

        let registration = ctx.plugins.tool(&tool_name);
        (registration.build)(ctx, &registration, mapping)
    }

    fn with_settings(
        ctx: &BuildContext<'_>,
        registration: &ToolRegistration,
        allow_mcp: bool,
        settings: ToolSettings,
    ) -> Self {
        Self {
            tool_name: registration.tool_name.clone(),
            allow_mcp,
            requires: registration.requires,
            mcp_wrapper: ctx.plugins.mcp_tool_wrapper(&registration.tool_name),
            settings,
            config_path: ctx.config_path.to_path_buf(),
        }
    }

    /// Last dotted segment of `tool_name`.
    pub fn kind(&self) -> &str {
        self.tool_name
            .rsplit_once('.')
            .map(|(_, kind)| kind)
            .unwrap_or(&self.tool_name)
    }

    /// Identifier the tool is exposed under.
    pub fn tool_id(&self) -> &str {
        self.kind()
    }

    pub fn binding(&self) -> ToolBinding<'_> {
        match self.requires {
            ToolRequires::Bare => ToolBinding::Bare,
            ToolRequires::Context => ToolBinding::InjectContext,
            ToolRequires::OwnConfig => ToolBinding::WithConfig(self),
        }
    }

    /// Whether the tool may be served over MCP, which cannot inject a
    /// request context.
    pub fn mcp_eligible(&self) -> bool {
        self.allow_mcp && self.requires != ToolRequires::Context
    }

    fn config_dir(&self) -> &Path {
        crate::discovery::config_dir(&self.config_path)
    }

    /// Variant-specific arguments passed alongside each invocation.
    pub fn extra_parameters(
        &self,
        lookup: &dyn InstallationLookup,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        let mut params = serde_json::Map::new();
        if let ToolSettings::SearchDocuments(settings) = &self.settings {
            params.insert(
                "expand_context_radius".into(),
                settings.expand_context_radius.into(),
            );
            params.insert(
                "search_documents_limit".into(),
                settings.search_documents_limit.into(),
            );
            params.insert("return_citations".into(), settings.return_citations.into());
            let db_path = self.rag_lancedb_path(lookup)?;
            params.insert(
                "rag_lancedb_path".into(),
                db_path.display().to_string().into(),
            );
        }
        Ok(params)
    }

    /// Directory of the search tool's RAG database, which must exist.
    pub fn rag_lancedb_path(&self, lookup: &dyn InstallationLookup) -> Result<PathBuf> {
        let ToolSettings::SearchDocuments(settings) = &self.settings else {
            return Err(ConfigError::missing(&self.config_path, "rag_lancedb_stem"));
        };

        let candidate = match &settings.rag_lancedb {
            RagDatabase::OverridePath(path) => normalize_path(&self.config_dir().join(path)),
            RagDatabase::Stem(stem) => {
                let base = lookup.get_environment(RAG_LANCE_DB_PATH).ok_or_else(|| {
                    ConfigError::MissingEnvironment {
                        key: RAG_LANCE_DB_PATH.to_string(),
                    }
                })?;
                normalize_path(&Path::new(&base).join(format!("{}.lancedb", stem)))
            }
        };

        if !candidate.is_dir() {
            return Err(ConfigError::RagDbNotFound {
                db_path: candidate.display().to_string(),
                path: self.config_path.display().to_string(),
            });
        }
        Ok(candidate)
    }
}

/// Build the `tools` list of a room or completion, keyed by kind.
pub fn extract_tool_configs(
    ctx: &BuildContext<'_>,
    entries: Vec<Value>,
) -> Result<BTreeMap<String, ToolConfig>> {
    let mut tools = BTreeMap::new();
    for entry in entries {
        let Value::Mapping(mapping) = entry else {
            return Err(ConfigError::missing(ctx.config_path, "tool_name"));
        };
        let tool = ToolConfig::from_yaml(ctx, mapping)?;
        tools.insert(tool.kind().to_string(), tool);
    }
    Ok(tools)
}

// ─────────────────────────────────────────────────────────────────────────────
// Builders
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PlainToolYaml {
    #[allow(dead_code)]
    tool_name: String,
    #[serde(default)]
    allow_mcp: bool,
}

fn build_plain(
    ctx: &BuildContext<'_>,
    registration: &ToolRegistration,
    mapping: Mapping,
) -> Result<ToolConfig> {
    let parsed: PlainToolYaml = serde_yaml::from_value(Value::Mapping(mapping))
        .map_err(|e| ConfigError::invalid(ctx.config_path, "tool config", e))?;
    Ok(ToolConfig::with_settings(
        ctx,
        registration,
        parsed.allow_mcp,
        ToolSettings::Bare,
    ))
}

/// Where the search tool's database lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RagDatabase {
    /// `<RAG_LANCE_DB_PATH>/<stem>.lancedb`
    Stem(String),
    /// Path relative to the declaring document.
    OverridePath(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchDocumentsSettings {
    pub rag_lancedb: RagDatabase,
    pub expand_context_radius: u32,
    pub search_documents_limit: u32,
    pub return_citations: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchDocumentsYaml {
    #[allow(dead_code)]
    tool_name: String,
    #[serde(default)]
    allow_mcp: bool,
    #[serde(default)]
    rag_lancedb_stem: Option<String>,
    #[serde(default)]
    rag_lancedb_override_path: Option<String>,
    #[serde(default = "default_expand_context_radius")]
    expand_context_radius: u32,
    #[serde(default = "default_search_documents_limit")]
    search_documents_limit: u32,
    #[serde(default)]
    return_citations: bool,
}

fn default_expand_context_radius() -> u32 {
    2
}

fn default_search_documents_limit() -> u32 {
    5
}

fn build_search_documents(
    ctx: &BuildContext<'_>,
    registration: &ToolRegistration,
    mapping: Mapping,
) -> Result<ToolConfig> {
    let parsed: SearchDocumentsYaml = serde_yaml::from_value(Value::Mapping(mapping))
        .map_err(|e| ConfigError::invalid(ctx.config_path, "search_documents tool config", e))?;

    let stem = parsed.rag_lancedb_stem.filter(|s| !s.is_empty());
    let override_path = parsed.rag_lancedb_override_path.filter(|s| !s.is_empty());
    let rag_lancedb = match (stem, override_path) {
        (Some(stem), None) => RagDatabase::Stem(stem),
        (None, Some(path)) => RagDatabase::OverridePath(path),
        _ => {
            return Err(ConfigError::RagDbExactlyOneOfStemOrOverride {
                path: ctx.config_path.display().to_string(),
            });
        }
    };

    let settings = SearchDocumentsSettings {
        rag_lancedb,
        expand_context_radius: parsed.expand_context_radius,
        search_documents_limit: parsed.search_documents_limit,
        return_citations: parsed.return_citations,
    };

    Ok(ToolConfig::with_settings(
        ctx,
        registration,
        parsed.allow_mcp,
        ToolSettings::SearchDocuments(settings),
    ))
}
