//! Configuration error types.

use crate::secrets::SecretError;

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading and resolving an installation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    // ── Structural ──────────────────────────────────────────────────────
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Expected config file is absent.
    #[error("no config file found at '{path}'")]
    NoSuchConfig { path: String },

    /// Config file is not valid YAML.
    #[error("failed to parse YAML in '{path}': {source}")]
    ParseYaml {
        path: String,
        source: serde_yaml::Error,
    },

    /// Config file parsed, but not to a mapping.
    #[error("config '{path}' must contain a mapping at the top level")]
    NotAMapping { path: String },

    /// A typed section of a config file failed to deserialize.
    #[error("invalid {what} in '{path}': {source}")]
    InvalidEntry {
        path: String,
        what: String,
        source: serde_yaml::Error,
    },

    /// Missing required field.
    #[error("missing required field '{field}' in '{path}'")]
    MissingField { field: String, path: String },

    /// A `.env` overlay could not be parsed.
    #[error("failed to parse dotenv file '{path}': {source}")]
    DotEnv {
        path: String,
        source: dotenvy::Error,
    },

    /// Tool names must be dotted references.
    #[error("invalid tool name '{tool_name}' in '{path}': expected a dotted name")]
    InvalidToolName { tool_name: String, path: String },

    /// Search tool declared both or neither of its database options.
    #[error(
        "exactly one of 'rag_lancedb_stem' or 'rag_lancedb_override_path' must be set in '{path}'"
    )]
    RagDbExactlyOneOfStemOrOverride { path: String },

    /// Resolved RAG database directory does not exist.
    #[error("RAG database '{db_path}' not found (configured in '{path}')")]
    RagDbNotFound { db_path: String, path: String },

    /// Quiz declared both or neither of its question file options.
    #[error("quiz '{quiz_id}' in '{path}' must set exactly one question file stem or override")]
    QuizExactlyOneOfStemOrOverride { quiz_id: String, path: String },

    /// No quizzes path holds `<stem>.json`.
    #[error("question file '{stem}.json' not found in any of: {searched}")]
    QuestionFileNotFoundWithStem { stem: String, searched: String },

    /// Explicit question file does not exist.
    #[error("question file '{override_path}' not found (configured in '{path}')")]
    QuestionFileNotFoundWithOverride { override_path: String, path: String },

    /// Question file is not valid question JSON.
    #[error("failed to parse question file '{path}': {source}")]
    ParseQuestions {
        path: String,
        source: serde_json::Error,
    },

    // ── Plugins ─────────────────────────────────────────────────────────
    /// No MCP toolset variant registered for this kind.
    #[error("unknown MCP toolset kind '{kind}' in '{path}'")]
    UnknownMcpToolsetKind { kind: String, path: String },

    /// No secret source variant registered for this kind.
    #[error("unknown secret source kind '{kind}' for secret '{secret_name}'")]
    UnknownSecretSourceKind { kind: String, secret_name: String },

    /// Meta-configuration names a constructor the catalog does not provide.
    #[error("unknown {section} plugin '{reference}'")]
    UnknownPlugin { section: String, reference: String },

    // ── Resolution ──────────────────────────────────────────────────────
    /// Value was expected to carry the `secret:` prefix.
    #[error("config '{value}' must be prefixed with 'secret:'")]
    NotASecret { value: String },

    /// Secret reference names an undeclared secret.
    #[error("secret '{name}' is not declared in the installation")]
    UnknownSecret { name: String },

    /// Secret resolution failed.
    #[error(transparent)]
    Secret(#[from] SecretError),

    /// One or more declared environment variables could not be resolved.
    #[error("missing environment variables: {}", .names.join(", "))]
    MissingEnvVars { names: Vec<String> },

    /// `file:` indirection applied to an already-indirected value.
    #[error("environment value for '{key}' has a nested 'file:' prefix: '{value}'")]
    NestedFilePrefix { key: String, value: String },

    /// An operation required an environment value that is not configured.
    #[error("environment value '{key}' is not configured")]
    MissingEnvironment { key: String },

    // ── Lookup ──────────────────────────────────────────────────────────
    /// Room id not found.
    #[error("room '{0}' not found")]
    RoomNotFound(String),

    /// Completion id not found.
    #[error("completion '{0}' not found")]
    CompletionNotFound(String),

    /// Quiz id not found within a room.
    #[error("quiz '{0}' not found")]
    QuizNotFound(String),

    /// Question uuid not found within a quiz.
    #[error("question '{0}' not found")]
    QuestionNotFound(String),

    /// Installation-level agent id not found.
    #[error("agent config '{0}' not found")]
    AgentNotFound(String),
}

impl ConfigError {
    /// Build an [`ConfigError::InvalidEntry`] for a YAML section.
    pub(crate) fn invalid(
        path: &std::path::Path,
        what: impl Into<String>,
        source: serde_yaml::Error,
    ) -> Self {
        ConfigError::InvalidEntry {
            path: path.display().to_string(),
            what: what.into(),
            source,
        }
    }

    /// Build a [`ConfigError::MissingField`].
    pub(crate) fn missing(path: &std::path::Path, field: &str) -> Self {
        ConfigError::MissingField {
            field: field.to_string(),
            path: path.display().to_string(),
        }
    }
}
