//! MCP client toolset configuration.
//!
//! Secret-valued fields stay unresolved until [`McpToolsetConfig::tool_kwargs`]
//! is called; [`McpToolsetConfig::toolset_params`] is the display view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::context::{BuildContext, InstallationLookup};
use crate::{ConfigError, Result};

/// Toolset run as a subprocess speaking MCP over stdio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdioToolsetConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Values are secret references.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
}

/// Toolset reached over streaming HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpToolsetConfig {
    pub url: String,
    /// Values may embed secret references (`Bearer secret:TOKEN`).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Values are secret references.
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
    #[serde(default)]
    pub allowed_tools: Option<Vec<String>>,
}

/// A configured MCP client toolset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum McpToolsetConfig {
    Stdio(StdioToolsetConfig),
    Http(HttpToolsetConfig),
}

/// Resolved connection arguments for an MCP client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum McpToolKwargs {
    Stdio {
        command: String,
        args: Vec<String>,
        env: BTreeMap<String, String>,
        allowed_tools: Option<Vec<String>>,
    },
    Http {
        url: String,
        headers: BTreeMap<String, String>,
        allowed_tools: Option<Vec<String>>,
    },
}

impl McpToolsetConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            McpToolsetConfig::Stdio(_) => "stdio",
            McpToolsetConfig::Http(_) => "http",
        }
    }

    pub fn allowed_tools(&self) -> Option<&[String]> {
        match self {
            McpToolsetConfig::Stdio(c) => c.allowed_tools.as_deref(),
            McpToolsetConfig::Http(c) => c.allowed_tools.as_deref(),
        }
    }

    /// Parameters as declared, secrets unresolved.
    pub fn toolset_params(&self) -> serde_json::Value {
        match self {
            McpToolsetConfig::Stdio(c) => serde_json::json!({
                "command": c.command,
                "args": c.args,
                "env": c.env,
                "allowed_tools": c.allowed_tools,
            }),
            McpToolsetConfig::Http(c) => serde_json::json!({
                "url": c.url,
                "headers": c.headers,
                "query_params": c.query_params,
                "allowed_tools": c.allowed_tools,
            }),
        }
    }

    /// Connection arguments with every secret resolved.
    pub fn tool_kwargs(&self, lookup: &dyn InstallationLookup) -> Result<McpToolKwargs> {
        match self {
            McpToolsetConfig::Stdio(c) => {
                let env = c
                    .env
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), lookup.get_secret(value)?)))
                    .collect::<Result<BTreeMap<_, _>>>()?;
                Ok(McpToolKwargs::Stdio {
                    command: c.command.clone(),
                    args: c.args.clone(),
                    env,
                    allowed_tools: c.allowed_tools.clone(),
                })
            }
            McpToolsetConfig::Http(c) => {
                let headers = c
                    .headers
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), lookup.interpolate_secret(value)?)))
                    .collect::<Result<BTreeMap<_, _>>>()?;

                let mut url = c.url.clone();
                if !c.query_params.is_empty() {
                    let mut query = url::form_urlencoded::Serializer::new(String::new());
                    for (key, value) in &c.query_params {
                        query.append_pair(key, &lookup.get_secret(value)?);
                    }
                    url = format!("{}?{}", url, query.finish());
                }

                Ok(McpToolKwargs::Http {
                    url,
                    headers,
                    allowed_tools: c.allowed_tools.clone(),
                })
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

/// Builds an [`McpToolsetConfig`] from its YAML mapping (with `kind` removed).
pub type McpToolsetBuilder = fn(&BuildContext<'_>, Mapping) -> Result<McpToolsetConfig>;

/// Registry entry for one MCP toolset kind.
#[derive(Clone)]
pub struct McpToolsetRegistration {
    pub kind: String,
    pub build: McpToolsetBuilder,
}

impl std::fmt::Debug for McpToolsetRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolsetRegistration")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl McpToolsetRegistration {
    pub fn new(kind: impl Into<String>, build: McpToolsetBuilder) -> Self {
        Self {
            kind: kind.into(),
            build,
        }
    }

    pub fn stdio() -> Self {
        Self::new("stdio", |ctx, mapping| {
            parse(ctx, "stdio MCP toolset", mapping).map(McpToolsetConfig::Stdio)
        })
    }

    pub fn http() -> Self {
        Self::new("http", |ctx, mapping| {
            parse(ctx, "http MCP toolset", mapping).map(McpToolsetConfig::Http)
        })
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    ctx: &BuildContext<'_>,
    what: &str,
    mapping: Mapping,
) -> Result<T> {
    serde_yaml::from_value(Value::Mapping(mapping))
        .map_err(|e| ConfigError::invalid(ctx.config_path, what, e))
}

/// Build the `mcp_client_toolsets` map of a room or completion.
pub fn extract_mcp_toolset_configs(
    ctx: &BuildContext<'_>,
    entries: BTreeMap<String, Mapping>,
) -> Result<BTreeMap<String, McpToolsetConfig>> {
    let mut toolsets = BTreeMap::new();
    for (name, mut mapping) in entries {
        let kind = match mapping.remove("kind") {
            Some(Value::String(kind)) => kind,
            _ => return Err(ConfigError::missing(ctx.config_path, "kind")),
        };
        let registration = ctx.plugins.mcp_toolset(&kind, ctx.config_path)?;
        toolsets.insert(name, (registration.build)(ctx, mapping)?);
    }
    Ok(toolsets)
}
