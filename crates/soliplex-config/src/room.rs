//! Room configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::agent::AgentConfig;
use crate::context::BuildContext;
use crate::mcp::{McpToolsetConfig, extract_mcp_toolset_configs};
use crate::quiz::QuizConfig;
use crate::tools::{ToolConfig, extract_tool_configs};
use crate::{ConfigError, Result};

/// A chat room: one agent plus its tools, toolsets and quizzes.
#[derive(Debug)]
pub struct RoomConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub agent: AgentConfig,
    /// Explicit sort position; see [`RoomConfig::sort_key`].
    pub order: Option<String>,
    pub welcome_message: Option<String>,
    pub suggestions: Vec<String>,
    pub enable_attachments: bool,
    pub allow_mcp: bool,
    pub tools: BTreeMap<String, ToolConfig>,
    pub mcp_client_toolsets: BTreeMap<String, McpToolsetConfig>,
    pub quizzes: Vec<QuizConfig>,
    pub logo_image: Option<String>,
    pub config_path: PathBuf,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RoomYaml {
    id: String,
    name: String,
    description: String,
    agent: Value,
    #[serde(default, rename = "_order")]
    order: Option<String>,
    #[serde(default)]
    welcome_message: Option<String>,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    enable_attachments: bool,
    #[serde(default)]
    allow_mcp: bool,
    #[serde(default)]
    tools: Vec<Value>,
    #[serde(default)]
    mcp_client_toolsets: BTreeMap<String, Mapping>,
    #[serde(default)]
    quizzes: Vec<Value>,
    #[serde(default)]
    logo_image: Option<String>,
}

impl RoomConfig {
    /// Build from a discovered `room_config.yaml` document.
    pub fn from_yaml(ctx: &BuildContext<'_>, mapping: Mapping) -> Result<Self> {
        let parsed: RoomYaml = serde_yaml::from_value(Value::Mapping(mapping))
            .map_err(|e| ConfigError::invalid(ctx.config_path, "room config", e))?;

        let agent = AgentConfig::from_yaml(ctx, Some(format!("room-{}", parsed.id)), parsed.agent)?;
        let tools = extract_tool_configs(ctx, parsed.tools)?;
        let mcp_client_toolsets = extract_mcp_toolset_configs(ctx, parsed.mcp_client_toolsets)?;
        let quizzes = parsed
            .quizzes
            .into_iter()
            .map(|quiz| QuizConfig::from_yaml(ctx, quiz))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: parsed.id,
            name: parsed.name,
            description: parsed.description,
            agent,
            order: parsed.order,
            welcome_message: parsed.welcome_message,
            suggestions: parsed.suggestions,
            enable_attachments: parsed.enable_attachments,
            allow_mcp: parsed.allow_mcp,
            tools,
            mcp_client_toolsets,
            quizzes,
            logo_image: parsed.logo_image,
            config_path: ctx.config_path.to_path_buf(),
        })
    }

    /// `_order` if set, otherwise the room id.
    pub fn sort_key(&self) -> &str {
        self.order.as_deref().unwrap_or(&self.id)
    }

    pub fn quiz_map(&self) -> BTreeMap<&str, &QuizConfig> {
        self.quizzes.iter().map(|quiz| (quiz.id.as_str(), quiz)).collect()
    }

    pub fn get_quiz(&self, quiz_id: &str) -> Result<&QuizConfig> {
        self.quizzes
            .iter()
            .find(|quiz| quiz.id == quiz_id)
            .ok_or_else(|| ConfigError::QuizNotFound(quiz_id.to_string()))
    }

    /// Logo image resolved against the room's directory.
    pub fn logo_image_path(&self) -> Option<PathBuf> {
        self.logo_image
            .as_ref()
            .map(|logo| self.config_dir().join(logo))
    }

    /// Tools this room exposes over MCP. Empty unless the room allows MCP.
    pub fn mcp_tools(&self) -> impl Iterator<Item = &ToolConfig> {
        self.tools
            .values()
            .filter(move |tool| self.allow_mcp && tool.mcp_eligible())
    }

    fn config_dir(&self) -> &Path {
        crate::discovery::config_dir(&self.config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::StaticLookup;
    use crate::registry::Plugins;
    use crate::tools::ToolRegistration;

    fn build(plugins: &Plugins, yaml: &str) -> Result<RoomConfig> {
        let lookup = StaticLookup::default();
        let ctx = BuildContext::new(&lookup, plugins, Path::new("/srv/rooms/lobby/room_config.yaml"));
        RoomConfig::from_yaml(&ctx, serde_yaml::from_str(yaml).unwrap())
    }

    const MINIMAL: &str = "id: lobby\nname: Lobby\ndescription: Entry room\nagent: {}\n";

    #[test]
    fn test_minimal_room() {
        let room = build(&Plugins::builtin(), MINIMAL).unwrap();
        assert_eq!(room.agent.id, "room-lobby");
        assert_eq!(room.sort_key(), "lobby");
        assert!(room.tools.is_empty());
        assert!(room.quizzes.is_empty());
        assert!(room.logo_image_path().is_none());
        assert!(!room.enable_attachments);
    }

    #[test]
    fn test_full_room() {
        let yaml = r#"
id: lobby
name: Lobby
description: Entry room
_order: "00"
welcome_message: Hello
suggestions: ["What is this?", "Help"]
enable_attachments: true
allow_mcp: true
logo_image: ./logo.svg
agent:
  system_prompt: Be nice.
tools:
  - tool_name: soliplex.tools.get_current_datetime
    allow_mcp: true
  - tool_name: acme.chat.whoami
    allow_mcp: true
mcp_client_toolsets:
  files:
    kind: stdio
    command: mcp-files
quizzes:
  - id: arith
    question_file: arith
"#;
        let mut plugins = Plugins::builtin();
        plugins
            .tools
            .register("acme.chat.whoami", ToolRegistration::with_context("acme.chat.whoami"));

        let room = build(&plugins, yaml).unwrap();
        assert_eq!(room.sort_key(), "00");
        assert_eq!(room.suggestions.len(), 2);
        assert_eq!(
            room.logo_image_path(),
            Some(PathBuf::from("/srv/rooms/lobby/./logo.svg"))
        );
        assert_eq!(room.mcp_client_toolsets["files"].kind(), "stdio");
        assert_eq!(room.get_quiz("arith").unwrap().judge_agent.id, "quiz-arith-judge");
        assert!(room.quiz_map().contains_key("arith"));
        assert!(matches!(room.get_quiz("nope"), Err(ConfigError::QuizNotFound(_))));

        let mcp: Vec<_> = room.mcp_tools().map(|t| t.kind()).collect();
        assert_eq!(mcp, vec!["get_current_datetime"]);
    }

    #[test]
    fn test_mcp_tools_empty_without_allow_mcp() {
        let yaml = format!(
            "{}tools:\n  - tool_name: soliplex.tools.get_current_datetime\n    allow_mcp: true\n",
            MINIMAL
        );
        let room = build(&Plugins::builtin(), &yaml).unwrap();
        assert_eq!(room.mcp_tools().count(), 0);
    }

    #[test]
    fn test_unknown_key_is_error() {
        let yaml = format!("{}colour: blue\n", MINIMAL);
        let err = build(&Plugins::builtin(), &yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { .. }));
    }

    #[test]
    fn test_missing_agent_is_error() {
        let err = build(&Plugins::builtin(), "id: x\nname: X\ndescription: d\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { .. }));
    }
}
