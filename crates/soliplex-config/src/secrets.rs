//! Secret declarations and the source fallback chain.
//!
//! A secret is a name plus an ordered list of sources. Resolution tries each
//! source in turn and the first success wins. Built-in source kinds:
//! - `env_var`: a variable in the process environment
//! - `file_path`: the contents of a file
//! - `subprocess`: trimmed stdout of a command
//! - `random_chars`: fresh random bytes, hex-encoded
//!
//! When every source fails, the error carries one failure per source.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::environment::EnvLookup;
use crate::registry::Plugins;
use crate::{ConfigError, Result};

/// Prefix marking a config value as a secret reference.
pub const SECRET_PREFIX: &str = "secret:";

/// Default length, in bytes, of a `random_chars` secret.
const DEFAULT_N_CHARS: usize = 32;

/// Errors raised while resolving secrets.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// Environment variable unset.
    #[error("environment variable '{env_var_name}' is not set")]
    EnvVarNotFound { env_var_name: String },

    /// Secret file missing or unreadable.
    #[error("secret file '{path}' could not be read: {source}")]
    FilePathNotFound {
        path: String,
        source: std::io::Error,
    },

    /// Command could not run, failed, or printed nothing.
    #[error("subprocess '{command_line}' failed: {reason}")]
    Subprocess {
        command_line: String,
        reason: String,
    },

    /// Every source of one secret failed.
    #[error("could not resolve secret '{secret_name}': {}", join_failures(.failures))]
    SourcesFailed {
        secret_name: String,
        failures: Vec<SecretError>,
    },

    /// Batch check found unresolvable secrets.
    #[error("secrets not found: {}", .secret_names.join(", "))]
    SecretsNotFound {
        secret_names: Vec<String>,
        failures: Vec<SecretError>,
    },
}

fn join_failures(failures: &[SecretError]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Sources
// ─────────────────────────────────────────────────────────────────────────────

/// One strategy for producing a secret value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretSource {
    EnvVar { env_var_name: String },
    /// Absolute path, resolved against the declaring file at load time.
    FilePath { file_path: PathBuf },
    Subprocess { command: String, args: Vec<String> },
    RandomChars { n_chars: usize },
}

impl SecretSource {
    /// Discriminator used in YAML.
    pub fn kind(&self) -> &'static str {
        match self {
            SecretSource::EnvVar { .. } => "env_var",
            SecretSource::FilePath { .. } => "file_path",
            SecretSource::Subprocess { .. } => "subprocess",
            SecretSource::RandomChars { .. } => "random_chars",
        }
    }

    /// Human-readable description, safe to print.
    pub fn describe(&self) -> String {
        match self {
            SecretSource::EnvVar { env_var_name } => format!("env var {}", env_var_name),
            SecretSource::FilePath { file_path } => format!("file {}", file_path.display()),
            SecretSource::Subprocess { command, args } => {
                format!("command `{}`", command_line(command, args))
            }
            SecretSource::RandomChars { n_chars } => format!("{} random bytes", n_chars),
        }
    }
}

fn command_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// What a source builder knows about the secret being declared.
#[derive(Debug, Clone, Copy)]
pub struct SourceContext<'a> {
    pub secret_name: &'a str,
    /// Directory of the declaring file.
    pub config_dir: &'a Path,
    pub config_path: &'a Path,
}

/// Builds a [`SecretSource`] from its YAML mapping (with `kind` removed).
pub type SecretSourceBuilder = fn(&SourceContext<'_>, Mapping) -> Result<SecretSource>;

/// Registry entry for one secret source kind.
#[derive(Clone)]
pub struct SecretSourceRegistration {
    pub kind: String,
    pub build: SecretSourceBuilder,
}

impl std::fmt::Debug for SecretSourceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSourceRegistration")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl SecretSourceRegistration {
    pub fn new(kind: impl Into<String>, build: SecretSourceBuilder) -> Self {
        Self {
            kind: kind.into(),
            build,
        }
    }

    pub fn env_var() -> Self {
        Self::new("env_var", build_env_var)
    }

    pub fn file_path() -> Self {
        Self::new("file_path", build_file_path)
    }

    pub fn subprocess() -> Self {
        Self::new("subprocess", build_subprocess)
    }

    pub fn random_chars() -> Self {
        Self::new("random_chars", build_random_chars)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct EnvVarYaml {
    #[serde(default)]
    env_var_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FilePathYaml {
    file_path: PathBuf,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SubprocessYaml {
    command: String,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RandomCharsYaml {
    #[serde(default = "default_n_chars")]
    n_chars: usize,
}

fn default_n_chars() -> usize {
    DEFAULT_N_CHARS
}

fn parse_source<T: serde::de::DeserializeOwned>(
    ctx: &SourceContext<'_>,
    kind: &str,
    mapping: Mapping,
) -> Result<T> {
    serde_yaml::from_value(Value::Mapping(mapping)).map_err(|e| {
        ConfigError::invalid(
            ctx.config_path,
            format!("{} source for secret '{}'", kind, ctx.secret_name),
            e,
        )
    })
}

fn build_env_var(ctx: &SourceContext<'_>, mapping: Mapping) -> Result<SecretSource> {
    let parsed: EnvVarYaml = parse_source(ctx, "env_var", mapping)?;
    Ok(SecretSource::EnvVar {
        env_var_name: parsed
            .env_var_name
            .unwrap_or_else(|| ctx.secret_name.to_string()),
    })
}

fn build_file_path(ctx: &SourceContext<'_>, mapping: Mapping) -> Result<SecretSource> {
    let parsed: FilePathYaml = parse_source(ctx, "file_path", mapping)?;
    Ok(SecretSource::FilePath {
        file_path: ctx.config_dir.join(parsed.file_path),
    })
}

fn build_subprocess(ctx: &SourceContext<'_>, mapping: Mapping) -> Result<SecretSource> {
    let parsed: SubprocessYaml = parse_source(ctx, "subprocess", mapping)?;
    Ok(SecretSource::Subprocess {
        command: parsed.command,
        args: parsed.args,
    })
}

fn build_random_chars(ctx: &SourceContext<'_>, mapping: Mapping) -> Result<SecretSource> {
    let parsed: RandomCharsYaml = parse_source(ctx, "random_chars", mapping)?;
    Ok(SecretSource::RandomChars {
        n_chars: parsed.n_chars,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Secret declarations
// ─────────────────────────────────────────────────────────────────────────────

/// A named secret and its ordered sources. `sources` is never empty.
#[derive(Debug, Clone)]
pub struct SecretConfig {
    pub secret_name: String,
    sources: Vec<SecretSource>,
    resolved: OnceLock<String>,
}

impl SecretConfig {
    /// Declare a secret. With no sources, falls back to an env var of the
    /// same name.
    pub fn new(secret_name: impl Into<String>, sources: Vec<SecretSource>) -> Self {
        let secret_name = secret_name.into();
        let sources = if sources.is_empty() {
            vec![SecretSource::EnvVar {
                env_var_name: secret_name.clone(),
            }]
        } else {
            sources
        };
        Self {
            secret_name,
            sources,
            resolved: OnceLock::new(),
        }
    }

    pub fn sources(&self) -> &[SecretSource] {
        &self.sources
    }

    /// Value cached by an earlier successful resolution.
    pub fn resolved(&self) -> Option<&str> {
        self.resolved.get().map(String::as_str)
    }

    /// Build from an installation `secrets` entry: either a bare name or a
    /// `{secret_name, sources}` mapping.
    pub fn from_yaml(plugins: &Plugins, config_path: &Path, value: Value) -> Result<Self> {
        if let Value::String(name) = value {
            return Ok(Self::new(name, Vec::new()));
        }

        let parsed: SecretYaml = serde_yaml::from_value(value)
            .map_err(|e| ConfigError::invalid(config_path, "secret", e))?;

        let ctx = SourceContext {
            secret_name: &parsed.secret_name,
            config_dir: crate::discovery::config_dir(config_path),
            config_path,
        };

        let mut sources = Vec::with_capacity(parsed.sources.len());
        for mut source_mapping in parsed.sources {
            let kind = match source_mapping.remove("kind") {
                Some(Value::String(kind)) => kind,
                _ => return Err(ConfigError::missing(config_path, "kind")),
            };
            let registration = plugins.secret_source(&kind, &parsed.secret_name)?;
            sources.push((registration.build)(&ctx, source_mapping)?);
        }

        Ok(Self::new(parsed.secret_name, sources))
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SecretYaml {
    secret_name: String,
    #[serde(default)]
    sources: Vec<Mapping>,
}

/// Strip the required `secret:` prefix from a secret reference.
pub fn strip_secret_prefix(value: &str) -> Result<&str> {
    value
        .strip_prefix(SECRET_PREFIX)
        .ok_or_else(|| ConfigError::NotASecret {
            value: value.to_string(),
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

/// Resolves secrets against an injected process environment.
#[derive(Clone)]
pub struct SecretResolver {
    env: EnvLookup,
}

impl std::fmt::Debug for SecretResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretResolver").finish_non_exhaustive()
    }
}

impl SecretResolver {
    pub fn new(env: EnvLookup) -> Self {
        Self { env }
    }

    /// Produce a value from a single source.
    pub fn resolve_source(&self, source: &SecretSource) -> std::result::Result<String, SecretError> {
        match source {
            SecretSource::EnvVar { env_var_name } => {
                (self.env)(env_var_name).ok_or_else(|| SecretError::EnvVarNotFound {
                    env_var_name: env_var_name.clone(),
                })
            }
            SecretSource::FilePath { file_path } => {
                std::fs::read_to_string(file_path).map_err(|e| SecretError::FilePathNotFound {
                    path: file_path.display().to_string(),
                    source: e,
                })
            }
            SecretSource::Subprocess { command, args } => run_subprocess(command, args),
            SecretSource::RandomChars { n_chars } => {
                let mut bytes = vec![0u8; *n_chars];
                rand::rng().fill_bytes(&mut bytes);
                Ok(hex::encode(bytes))
            }
        }
    }

    /// Resolve a secret: the first source to succeed wins.
    ///
    /// Successful values are cached on the [`SecretConfig`].
    pub fn resolve(&self, secret: &SecretConfig) -> std::result::Result<String, SecretError> {
        if let Some(value) = secret.resolved.get() {
            return Ok(value.clone());
        }

        let mut failures = Vec::new();
        for source in &secret.sources {
            match self.resolve_source(source) {
                Ok(value) => {
                    debug!(secret = %secret.secret_name, source = source.kind(), "resolved secret");
                    return Ok(secret.resolved.get_or_init(|| value).clone());
                }
                Err(e) => {
                    debug!(
                        secret = %secret.secret_name,
                        source = source.kind(),
                        error = %e,
                        "secret source failed"
                    );
                    failures.push(e);
                }
            }
        }

        Err(SecretError::SourcesFailed {
            secret_name: secret.secret_name.clone(),
            failures,
        })
    }

    /// Resolve every secret, reporting all failures at once.
    pub fn check_secrets<'a>(
        &self,
        secrets: impl IntoIterator<Item = &'a SecretConfig>,
    ) -> std::result::Result<(), SecretError> {
        let mut secret_names = Vec::new();
        let mut failures = Vec::new();

        for secret in secrets {
            if let Err(e) = self.resolve(secret) {
                secret_names.push(secret.secret_name.clone());
                failures.push(e);
            }
        }

        if secret_names.is_empty() {
            Ok(())
        } else {
            Err(SecretError::SecretsNotFound {
                secret_names,
                failures,
            })
        }
    }
}

fn run_subprocess(command: &str, args: &[String]) -> std::result::Result<String, SecretError> {
    let failed = |reason: String| SecretError::Subprocess {
        command_line: command_line(command, args),
        reason,
    };

    let output = Command::new(command)
        .args(args)
        .output()
        .map_err(|e| failed(e.to_string()))?;

    if !output.status.success() {
        return Err(failed(format!("exited with {}", output.status)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(failed("produced no output".to_string()));
    }
    Ok(trimmed.to_string())
}
