//! Configuration loading and provider selection.
//!
//! The config file is plain JSON; once loaded, the structs are handed to
//! constructors and never consulted through globals. The path is resolved in
//! priority order:
//! 1. `--config` CLI flag
//! 2. `MANIFESTER_CONFIG` environment variable
//! 3. `<user config dir>/manifester/config.json`
use crate::cache::CacheConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MANIFESTER_CONFIG";
/// Language the generated manifest comments and prose should use.
pub const DEFAULT_LANGUAGE: &str = "english";
/// Namespace assigned to namespaced resources that declare none.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Missing or invalid provider, cache or cluster setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("AI provider not specified in configuration")]
    NoProviders,

    #[error("default AI provider not specified")]
    NoDefaultProvider,

    #[error("AI provider {0} not found in configuration")]
    ProviderNotFound(String),

    #[error("unsupported AI provider backend {0}")]
    UnknownBackend(String),

    #[error("provider {provider}: missing {field}")]
    MissingField {
        provider: String,
        field: &'static str,
    },

    #[error("cluster connection: {0}")]
    Cluster(String),
}

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl AppConfig {
    pub fn language(&self) -> &str {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_LANGUAGE)
    }
}

/// Provider registry: the configured providers plus which one to use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiConfig {
    #[serde(default)]
    pub default_provider: String,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl AiConfig {
    /// Resolve the default provider entry.
    pub fn selected_provider(&self) -> Result<&ProviderConfig, ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        let wanted = self.default_provider.trim();
        if wanted.is_empty() {
            return Err(ConfigError::NoDefaultProvider);
        }
        self.providers
            .iter()
            .find(|provider| provider.name == wanted)
            .ok_or_else(|| ConfigError::ProviderNotFound(wanted.to_string()))
    }
}

/// Credentials and tuning for one provider entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Entry name referenced by `default_provider`.
    pub name: String,
    /// Client implementation (`cozebot`, `arkai`); defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ProviderConfig {
    pub fn backend(&self) -> &str {
        self.backend.as_deref().unwrap_or(&self.name)
    }

    /// Identity folded into cache keys. Two entries sharing a backend but
    /// pointing at different endpoints, models or bots never share answers.
    pub fn cache_identity(&self) -> String {
        serde_json::json!([
            self.name,
            self.backend(),
            self.base_url.as_deref().unwrap_or_default().trim(),
            self.model.as_deref().unwrap_or_default().trim(),
            self.bot_id.as_deref().unwrap_or_default().trim(),
        ])
        .to_string()
    }

    /// Fetch a required, non-empty field.
    pub fn require<'a>(
        &self,
        value: &'a Option<String>,
        field: &'static str,
    ) -> Result<&'a str, ConfigError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                provider: self.name.clone(),
                field,
            })
    }
}

/// Cluster connection parameters.
///
/// Sources in priority order: an explicit `server`, an explicit
/// `kubeconfig` path, the in-cluster service account, then `KUBECONFIG` or
/// `~/.kube/config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<PathBuf>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ClusterConfig {
    pub fn default_namespace(&self) -> &str {
        self.namespace
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE)
    }
}

/// Resolve which config file to read.
pub fn resolve_config_path(flag: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(path.to_path_buf());
    }
    if let Some(raw) = env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(raw));
    }
    dirs::config_dir().map(|dir| dir.join("manifester").join("config.json"))
}

/// Load a config file.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: AppConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

/// Load the config at `path`, or the default one when no file exists there.
pub fn load_config_or_default(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) if path.is_file() => load_config(path),
        Some(path) => {
            tracing::debug!(path = %path.display(), "config file not found; using defaults");
            Ok(AppConfig::default())
        }
        None => Ok(AppConfig::default()),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
