//! CLI command handlers.

pub mod check;
pub mod completions;
pub mod environment;
pub mod oidc;
pub mod rooms;
pub mod secrets;

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use console::{Style, style};
use soliplex_config::{InstallationConfig, load_installation};
use tracing::debug;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Installation file or directory.
    pub installation_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load the installation and discover its rooms, completions and OIDC
    /// systems.
    pub fn installation(&self) -> Result<InstallationConfig> {
        let Some(path) = &self.installation_path else {
            bail!("Installation path not found. Pass --installation-path or set SOLIPLEX_INSTALLATION_PATH.");
        };

        debug!(path = %path.display(), "Loading installation");
        let installation = load_installation(path)
            .with_context(|| format!("failed to load installation from {}", path.display()))?;
        installation.reload_configurations()?;
        Ok(installation)
    }
}

/// Print a bold heading with a dim rule beneath it.
pub(crate) fn print_heading(title: &str) {
    let dim = Style::new().dim();
    println!("{}", style(title).bold());
    println!("{}", dim.apply_to("─".repeat(title.chars().count().max(20))));
}
