//! Crate-level error aggregating each stage's taxonomy.
//!
//! Every stage owns a closed enum next to its code; this type only exists so
//! the generation and apply entry points can return a single error.
use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::kube::ApplyError;
use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
