//! Completion endpoint configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::agent::AgentConfig;
use crate::context::BuildContext;
use crate::mcp::{McpToolsetConfig, extract_mcp_toolset_configs};
use crate::tools::{ToolConfig, extract_tool_configs};
use crate::{ConfigError, Result};

#[derive(Debug)]
pub struct CompletionConfig {
    pub id: String,
    pub name: String,
    pub agent: AgentConfig,
    pub tools: BTreeMap<String, ToolConfig>,
    pub mcp_client_toolsets: BTreeMap<String, McpToolsetConfig>,
    pub config_path: PathBuf,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CompletionYaml {
    id: String,
    #[serde(default)]
    name: Option<String>,
    agent: Value,
    #[serde(default)]
    tools: Vec<Value>,
    #[serde(default)]
    mcp_client_toolsets: BTreeMap<String, Mapping>,
}

impl CompletionConfig {
    /// Build from a discovered `completion_config.yaml` document.
    pub fn from_yaml(ctx: &BuildContext<'_>, mapping: Mapping) -> Result<Self> {
        let parsed: CompletionYaml = serde_yaml::from_value(Value::Mapping(mapping))
            .map_err(|e| ConfigError::invalid(ctx.config_path, "completion config", e))?;

        let agent = AgentConfig::from_yaml(
            ctx,
            Some(format!("completion-{}", parsed.id)),
            parsed.agent,
        )?;

        Ok(Self {
            name: parsed.name.unwrap_or_else(|| parsed.id.clone()),
            id: parsed.id,
            agent,
            tools: extract_tool_configs(ctx, parsed.tools)?,
            mcp_client_toolsets: extract_mcp_toolset_configs(ctx, parsed.mcp_client_toolsets)?,
            config_path: ctx.config_path.to_path_buf(),
        })
    }
}
