//! LM provider clients.
//!
//! A provider turns a prompt into completion text. Clients share the retry
//! state machine in [`retry`]; each one only decides how its responses map onto
//! [`AttemptOutcome`].
use crate::cancel::{CancelReason, CancelToken};
use crate::config::{ConfigError, ProviderConfig};
use thiserror::Error;

mod ark;
mod coze;
mod http;
mod retry;

pub use ark::{ArkClient, ARK_CLIENT_NAME};
pub use coze::{CozeBotClient, COZE_BOT_CLIENT_NAME};
pub use retry::{run_with_retry, AttemptOutcome, RetryPolicy, MAX_ATTEMPTS, RETRY_DELAY};

/// Provider failures, split by whether retrying was worthwhile.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: still overloaded after {attempts} attempts: {message}")]
    Transient {
        provider: String,
        attempts: u32,
        message: String,
    },

    #[error("{provider}: attempt {attempt} failed: {message}")]
    Fatal {
        provider: String,
        attempt: u32,
        message: String,
    },

    #[error("{provider}: {reason} at attempt {attempt}")]
    Cancelled {
        provider: String,
        attempt: u32,
        reason: CancelReason,
    },

    #[error("{provider}: client used before configure")]
    NotConfigured { provider: String },
}

/// An LM completion service.
pub trait Provider: Send + Sync {
    /// Validate and absorb credentials/settings.
    fn configure(&mut self, config: &ProviderConfig) -> Result<(), ConfigError>;

    /// Obtain completion text for `prompt`, honoring `cancel`.
    fn get_completion(&self, cancel: &CancelToken, prompt: &str) -> Result<String, ProviderError>;

    /// Client implementation name, used in errors and logs.
    fn name(&self) -> &str;

    /// Identity of the configured entry, part of every cache key.
    fn cache_identity(&self) -> &str {
        self.name()
    }

    /// Release held resources.
    fn close(&mut self) {}
}

/// Build and configure the client for a provider entry.
pub fn new_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>, ConfigError> {
    let mut provider: Box<dyn Provider> = match config.backend() {
        COZE_BOT_CLIENT_NAME => Box::new(CozeBotClient::default()),
        ARK_CLIENT_NAME => Box::new(ArkClient::default()),
        other => return Err(ConfigError::UnknownBackend(other.to_string())),
    };
    provider.configure(config)?;
    tracing::debug!(provider = provider.name(), entry = %config.name, "provider configured");
    Ok(provider)
}
