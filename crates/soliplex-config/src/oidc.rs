//! OIDC authentication system configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::context::InstallationLookup;
use crate::discovery::{OIDC_CONFIG_FILE, config_dir, find_configs};
use crate::{ConfigError, Result};

const WELL_KNOWN_OPENID_CONFIGURATION: &str = ".well-known/openid-configuration";

/// One OIDC identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OidcAuthSystemConfig {
    pub id: String,
    pub title: String,
    pub server_url: String,
    pub token_validation_pem: String,
    pub client_id: String,
    pub scope: Option<String>,
    /// A secret reference, or the literal secret.
    #[serde(skip)]
    pub client_secret: String,
    pub oidc_client_pem_path: Option<PathBuf>,
    #[serde(skip)]
    pub config_path: PathBuf,
}

/// Arguments for registering an OAuth client with this provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuthClientParams {
    pub name: String,
    pub server_metadata_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub client_kwargs: OAuthClientKwargs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OAuthClientKwargs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// CA bundle used to verify the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OidcDocumentYaml {
    auth_systems: Vec<OidcAuthSystemYaml>,
    #[serde(default)]
    oidc_client_pem_path: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OidcAuthSystemYaml {
    id: String,
    title: String,
    server_url: String,
    token_validation_pem: String,
    client_id: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    client_secret: String,
    #[serde(default)]
    oidc_client_pem_path: Option<String>,
}

impl OidcAuthSystemConfig {
    pub fn server_metadata_url(&self) -> String {
        format!("{}/{}", self.server_url, WELL_KNOWN_OPENID_CONFIGURATION)
    }

    /// Client registration arguments. `client_secret` is resolved as a secret
    /// when it names one, otherwise passed through as-is.
    pub fn oauth_client_params(&self, lookup: &dyn InstallationLookup) -> OAuthClientParams {
        let client_secret = lookup
            .get_secret(&self.client_secret)
            .unwrap_or_else(|e| {
                debug!(
                    auth_system = %self.id,
                    error = %e,
                    "client_secret not resolved as a secret, using it verbatim"
                );
                self.client_secret.clone()
            });

        OAuthClientParams {
            name: self.id.clone(),
            server_metadata_url: self.server_metadata_url(),
            client_id: self.client_id.clone(),
            client_secret,
            client_kwargs: OAuthClientKwargs {
                scope: self.scope.clone(),
                verify: self
                    .oidc_client_pem_path
                    .as_ref()
                    .map(|path| path.display().to_string()),
            },
        }
    }
}

/// Parse one OIDC `config.yaml` document into its auth systems.
///
/// A document-level `oidc_client_pem_path` applies to every system that does
/// not set its own. Pem paths resolve against the document's directory.
pub fn auth_systems_from_yaml(config_path: &Path, mapping: Mapping) -> Result<Vec<OidcAuthSystemConfig>> {
    let parsed: OidcDocumentYaml = serde_yaml::from_value(Value::Mapping(mapping))
        .map_err(|e| ConfigError::invalid(config_path, "OIDC config", e))?;
    let dir = config_dir(config_path);

    Ok(parsed
        .auth_systems
        .into_iter()
        .map(|system| {
            let pem = system
                .oidc_client_pem_path
                .or_else(|| parsed.oidc_client_pem_path.clone())
                .map(|pem| dir.join(pem));
            OidcAuthSystemConfig {
                id: system.id,
                title: system.title,
                server_url: system.server_url,
                token_validation_pem: system.token_validation_pem,
                client_id: system.client_id,
                scope: system.scope,
                client_secret: system.client_secret,
                oidc_client_pem_path: pem,
                config_path: config_path.to_path_buf(),
            }
        })
        .collect())
}

/// Load every auth system found under the given OIDC roots, in root order.
pub fn load_oidc_auth_systems(roots: &[PathBuf]) -> Result<Vec<OidcAuthSystemConfig>> {
    let mut systems = Vec::new();
    for root in roots {
        for (config_path, mapping) in find_configs(root, OIDC_CONFIG_FILE)? {
            let found = auth_systems_from_yaml(&config_path, mapping)?;
            debug!(path = %config_path.display(), count = found.len(), "loaded OIDC auth systems");
            systems.extend(found);
        }
    }
    Ok(systems)
}
