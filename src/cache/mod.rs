//! Completion cache: key derivation, the backend trait, and value encoding.
//!
//! Values are stored base64 encoded so any backend can hold arbitrary
//! generated text. Disabling a cache only affects reads: `exists` reports
//! false and `load` misses, while `store` keeps writing so a forced
//! regeneration still warms the cache.
//!
//! There is no single-flight guard. Two callers missing on the same key both
//! reach the provider, and the later `store` wins.
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

mod file;
mod key;
mod memory;

pub use file::FileCache;
pub use key::{derive_key, CacheKey};
pub use memory::MemoryCache;

/// Errors from cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache miss for key {key}")]
    Miss { key: String },

    #[error("cache io for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cached value for key {key} is not valid encoded text: {message}")]
    Encoding { key: String, message: String },
}

/// Key/value store for generated completions.
///
/// Implementations must tolerate concurrent calls for distinct or identical
/// keys.
pub trait CompletionCache: Send + Sync {
    /// True when a value is present and reads are enabled. Never errors.
    fn exists(&self, key: &CacheKey) -> bool;

    /// Load the stored (encoded) value.
    fn load(&self, key: &CacheKey) -> Result<String, CacheError>;

    /// Store a value, overwriting any previous one.
    fn store(&self, key: &CacheKey, value: &str) -> Result<(), CacheError>;

    /// Disable reads for the rest of the process lifetime.
    fn disable(&self);

    fn is_disabled(&self) -> bool;
}

/// Backend selection from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheConfig {
    /// One file per key; `path` defaults to the user cache directory.
    File {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    /// Process-local map, lost on exit.
    Memory,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::File { path: None }
    }
}

/// Default directory for the file cache.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("manifester")
}

/// Build the configured backend.
pub fn open_cache(config: &CacheConfig) -> Arc<dyn CompletionCache> {
    match config {
        CacheConfig::File { path } => {
            let dir = path.clone().unwrap_or_else(default_cache_dir);
            tracing::debug!(dir = %dir.display(), "using file cache");
            Arc::new(FileCache::new(dir))
        }
        CacheConfig::Memory => Arc::new(MemoryCache::new()),
    }
}

/// Encode generated text for storage.
pub fn encode_value(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

/// Decode a stored value back into the generated text.
pub fn decode_value(key: &CacheKey, encoded: &str) -> Result<String, CacheError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| CacheError::Encoding {
            key: key.to_string(),
            message: err.to_string(),
        })?;
    String::from_utf8(bytes).map_err(|err| CacheError::Encoding {
        key: key.to_string(),
        message: err.to_string(),
    })
}
