//! Manifest generation: cache lookup, provider call, and cache write.
//!
//! Cache reads are best-effort: a failing or corrupt entry is logged and the
//! manifest is regenerated. Cache writes after a successful generation are
//! not; a failed store is returned to the caller.
use crate::cache::{decode_value, derive_key, encode_value, open_cache, CompletionCache};
use crate::cancel::CancelToken;
use crate::config::{AppConfig, ConfigError};
use crate::provider::{new_provider, Provider};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod fence;

pub use fence::strip_fence;

const MANIFEST_PROMPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/k8s_manifest.md"
));

/// Outcome label carried in machine-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestStatus {
    Generated,
    Failed,
}

/// Generation result as emitted by `--json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDocument {
    pub status: ManifestStatus,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub yaml: String,
}

impl GeneratedDocument {
    pub fn generated(yaml: String) -> Self {
        Self {
            status: ManifestStatus::Generated,
            errors: Vec::new(),
            yaml,
        }
    }

    pub fn failed(err: &Error) -> Self {
        let mut errors = vec![err.to_string()];
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            errors.push(cause.to_string());
            source = cause.source();
        }
        Self {
            status: ManifestStatus::Failed,
            errors,
            yaml: String::new(),
        }
    }
}

/// Caller choices that shape caching for one generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    pub language: String,
    /// Skip cache reads (force regeneration).
    pub no_cache: bool,
    /// Write successful generations to the cache, even when reads are skipped.
    pub store_results: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            language: crate::config::DEFAULT_LANGUAGE.to_string(),
            no_cache: false,
            store_results: true,
        }
    }
}

pub struct Manifester {
    provider: Box<dyn Provider>,
    cache: Arc<dyn CompletionCache>,
    language: String,
    store_results: bool,
}

impl Manifester {
    pub fn new(
        provider: Box<dyn Provider>,
        cache: Arc<dyn CompletionCache>,
        options: GenerateOptions,
    ) -> Self {
        if options.no_cache {
            cache.disable();
        }
        Self {
            provider,
            cache,
            language: options.language,
            store_results: options.store_results,
        }
    }

    /// Select the default provider and cache backend from configuration.
    pub fn from_config(
        config: &AppConfig,
        options: GenerateOptions,
    ) -> std::result::Result<Self, ConfigError> {
        let provider_config = config.ai.selected_provider()?;
        let provider = new_provider(provider_config)?;
        let cache = open_cache(&config.cache);
        Ok(Self::new(provider, cache, options))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Produce the raw completion for `requirement`, from cache when possible.
    pub fn generate_manifest(&self, cancel: &CancelToken, requirement: &str) -> Result<String> {
        let key = derive_key(self.provider.cache_identity(), &self.language, requirement);

        if !self.cache.is_disabled() && self.cache.exists(&key) {
            match self
                .cache
                .load(&key)
                .and_then(|stored| decode_value(&key, &stored))
            {
                Ok(text) if !text.is_empty() => {
                    tracing::info!(key = %key, "manifest cache hit");
                    return Ok(text);
                }
                Ok(_) => tracing::debug!(key = %key, "empty cache entry; regenerating"),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "cache load failed; regenerating")
                }
            }
        }

        let prompt = build_prompt(&self.language, requirement);
        let response = self.provider.get_completion(cancel, &prompt)?;

        if self.store_results {
            self.cache.store(&key, &encode_value(&response))?;
        }
        Ok(response)
    }

    /// Generate and strip any code fence, folding errors into the document.
    pub fn generate_document(&self, cancel: &CancelToken, requirement: &str) -> GeneratedDocument {
        match self.generate_manifest(cancel, requirement) {
            Ok(response) => GeneratedDocument::generated(strip_fence(&response)),
            Err(err) => GeneratedDocument::failed(&err),
        }
    }

    pub fn close(&mut self) {
        self.provider.close();
    }
}

impl Drop for Manifester {
    fn drop(&mut self) {
        self.close();
    }
}

/// Fill the manifest prompt template.
pub fn build_prompt(language: &str, requirement: &str) -> String {
    MANIFEST_PROMPT
        .trim()
        .replace("{language}", language)
        .replace("{requirements}", requirement.trim())
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
