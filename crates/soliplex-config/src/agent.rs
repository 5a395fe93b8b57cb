//! Agent configuration: LLM provider, model and system prompt.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::context::{BuildContext, InstallationLookup};
use crate::{ConfigError, Result};

/// Environment key supplying the default model name.
pub const DEFAULT_AGENT_MODEL: &str = "DEFAULT_AGENT_MODEL";

/// Environment key supplying the default provider base URL.
pub const OLLAMA_BASE_URL: &str = "OLLAMA_BASE_URL";

/// LLM provider API flavour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Openai,
    #[default]
    Ollama,
}

/// A configured agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentConfig {
    pub id: String,
    pub model_name: Option<String>,
    /// Literal prompt text. Wins over `system_prompt_path`.
    pub system_prompt_text: Option<String>,
    /// Prompt file relative to the declaring document.
    pub system_prompt_path: Option<String>,
    pub provider_type: ProviderType,
    pub provider_base_url: Option<String>,
    /// Secret reference holding the provider API key.
    pub provider_key: Option<String>,
    #[serde(skip)]
    pub config_path: PathBuf,
}

/// Keyword arguments for constructing a provider client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LlmProviderParams {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AgentYaml {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model_name: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    provider_type: ProviderType,
    #[serde(default)]
    provider_base_url: Option<String>,
    #[serde(default)]
    provider_key: Option<String>,
}

impl AgentConfig {
    /// An agent with provider defaults and no prompt.
    pub fn new(id: impl Into<String>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            model_name: None,
            system_prompt_text: None,
            system_prompt_path: None,
            provider_type: ProviderType::default(),
            provider_base_url: None,
            provider_key: None,
            config_path: config_path.into(),
        }
    }

    /// Build from an `agent` mapping.
    ///
    /// Rooms and completions pass `id_override`, since their agent id derives
    /// from the owning document; installation-level agents declare their own.
    pub fn from_yaml(
        ctx: &BuildContext<'_>,
        id_override: Option<String>,
        value: Value,
    ) -> Result<Self> {
        let parsed: AgentYaml = serde_yaml::from_value(value)
            .map_err(|e| ConfigError::invalid(ctx.config_path, "agent config", e))?;

        let Some(id) = id_override.or(parsed.id) else {
            return Err(ConfigError::missing(ctx.config_path, "id"));
        };

        let (system_prompt_text, system_prompt_path) = match parsed.system_prompt {
            Some(prompt) if prompt.starts_with("./") => (None, Some(prompt)),
            Some(prompt) => (Some(prompt), None),
            None => (None, None),
        };

        let model_name = parsed
            .model_name
            .or_else(|| ctx.lookup.get_environment(DEFAULT_AGENT_MODEL));

        Ok(Self {
            id,
            model_name,
            system_prompt_text,
            system_prompt_path,
            provider_type: parsed.provider_type,
            provider_base_url: parsed.provider_base_url,
            provider_key: parsed.provider_key,
            config_path: ctx.config_path.to_path_buf(),
        })
    }

    /// The system prompt, reading the prompt file if one is configured.
    pub fn get_system_prompt(&self) -> Result<Option<String>> {
        if let Some(text) = &self.system_prompt_text {
            return Ok(Some(text.clone()));
        }

        let Some(relative) = &self.system_prompt_path else {
            return Ok(None);
        };

        let path = crate::discovery::config_dir(&self.config_path).join(relative);
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| ConfigError::ReadFile {
                path: path.display().to_string(),
                source: e,
            })
    }

    /// Configured base URL, falling back to the installation's `OLLAMA_BASE_URL`.
    pub fn provider_base_url(&self, lookup: &dyn InstallationLookup) -> Option<String> {
        self.provider_base_url
            .clone()
            .or_else(|| lookup.get_environment(OLLAMA_BASE_URL))
    }

    pub fn llm_provider_params(&self, lookup: &dyn InstallationLookup) -> Result<LlmProviderParams> {
        let base_url =
            self.provider_base_url(lookup)
                .ok_or_else(|| ConfigError::MissingEnvironment {
                    key: OLLAMA_BASE_URL.to_string(),
                })?;

        let api_key = match &self.provider_key {
            Some(secret_ref) => Some(lookup.get_secret(secret_ref)?),
            None => None,
        };

        Ok(LlmProviderParams {
            base_url: format!("{}/v1", base_url),
            api_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::StaticLookup;
    use crate::registry::Plugins;
    use std::path::Path;
    use tempfile::TempDir;

    fn build(lookup: &StaticLookup, config_path: &Path, id: Option<&str>, yaml: &str) -> Result<AgentConfig> {
        let plugins = Plugins::builtin();
        let ctx = BuildContext::new(lookup, &plugins, config_path);
        AgentConfig::from_yaml(&ctx, id.map(str::to_string), serde_yaml::from_str(yaml).unwrap())
    }

    #[test]
    fn test_defaults() {
        let lookup = StaticLookup::default().with_env(DEFAULT_AGENT_MODEL, "qwen3:8b");
        let agent = build(&lookup, Path::new("room_config.yaml"), Some("room-lobby"), "{}").unwrap();
        assert_eq!(agent.id, "room-lobby");
        assert_eq!(agent.model_name.as_deref(), Some("qwen3:8b"));
        assert_eq!(agent.provider_type, ProviderType::Ollama);
        assert_eq!(agent.get_system_prompt().unwrap(), None);
    }

    #[test]
    fn test_id_required_without_override() {
        let err = build(
            &StaticLookup::default(),
            Path::new("installation.yaml"),
            None,
            "model_name: llama3\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "id"));
    }

    #[test]
    fn test_override_replaces_declared_id() {
        let agent = build(
            &StaticLookup::default(),
            Path::new("room_config.yaml"),
            Some("room-lobby"),
            "id: ignored\n",
        )
        .unwrap();
        assert_eq!(agent.id, "room-lobby");
    }

    #[test]
    fn test_literal_system_prompt() {
        let agent = build(
            &StaticLookup::default(),
            Path::new("room_config.yaml"),
            Some("room-a"),
            "system_prompt: You are helpful.\n",
        )
        .unwrap();
        assert_eq!(agent.get_system_prompt().unwrap().as_deref(), Some("You are helpful."));
        assert!(agent.system_prompt_path.is_none());
    }

    #[test]
    fn test_system_prompt_file_relative_to_document() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("prompt.txt"), "From a file.").unwrap();
        let config_path = dir.path().join("room_config.yaml");

        let agent = build(
            &StaticLookup::default(),
            &config_path,
            Some("room-a"),
            "system_prompt: ./prompt.txt\n",
        )
        .unwrap();
        assert_eq!(agent.system_prompt_path.as_deref(), Some("./prompt.txt"));
        assert_eq!(agent.get_system_prompt().unwrap().as_deref(), Some("From a file."));
    }

    #[test]
    fn test_missing_prompt_file() {
        let dir = TempDir::new().unwrap();
        let agent = build(
            &StaticLookup::default(),
            &dir.path().join("room_config.yaml"),
            Some("room-a"),
            "system_prompt: ./absent.txt\n",
        )
        .unwrap();
        assert!(matches!(agent.get_system_prompt(), Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_llm_provider_params() {
        let lookup = StaticLookup::default()
            .with_env(OLLAMA_BASE_URL, "http://ollama:11434")
            .with_secret("OPENAI_KEY", "sk-test");

        let ollama = build(&lookup, Path::new("c.yaml"), Some("a"), "{}").unwrap();
        assert_eq!(
            ollama.llm_provider_params(&lookup).unwrap(),
            LlmProviderParams {
                base_url: "http://ollama:11434/v1".to_string(),
                api_key: None,
            }
        );

        let openai = build(
            &lookup,
            Path::new("c.yaml"),
            Some("b"),
            "provider_type: openai\nprovider_base_url: https://api.example.com\nprovider_key: secret:OPENAI_KEY\n",
        )
        .unwrap();
        let params = openai.llm_provider_params(&lookup).unwrap();
        assert_eq!(params.base_url, "https://api.example.com/v1");
        assert_eq!(params.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_llm_provider_params_without_base_url() {
        let lookup = StaticLookup::default();
        let agent = build(&lookup, Path::new("c.yaml"), Some("a"), "{}").unwrap();
        assert!(matches!(
            agent.llm_provider_params(&lookup),
            Err(ConfigError::MissingEnvironment { .. })
        ));
    }

    #[test]
    fn test_unknown_provider_type_rejected() {
        let err = build(
            &StaticLookup::default(),
            Path::new("c.yaml"),
            Some("a"),
            "provider_type: anthropic\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEntry { .. }));
    }
}
