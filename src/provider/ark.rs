//! Ark (OpenAI-compatible chat completions) client.
use super::http::{body_preview, build_agent, post_json};
use super::{run_with_retry, AttemptOutcome, Provider, ProviderError, RetryPolicy};
use crate::cancel::CancelToken;
use crate::config::{ConfigError, ProviderConfig};
use serde::{Deserialize, Serialize};

pub const ARK_CLIENT_NAME: &str = "arkai";

const COMPLETIONS_PATH: &str = "/api/v3/chat/completions";
const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Default)]
pub struct ArkClient {
    agent: Option<ureq::Agent>,
    identity: String,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: Option<f32>,
    policy: RetryPolicy,
}

impl ArkClient {
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

fn is_overload_code(code: &str) -> bool {
    code.starts_with("RateLimitExceeded")
        || code == "ServerOverloaded"
        || code == "rate_limit_exceeded"
}

pub(crate) fn classify(status: u16, body: &str) -> AttemptOutcome {
    let ok = (200..300).contains(&status);
    let response: CompletionResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(err) if ok => {
            return AttemptOutcome::Fatal(format!(
                "malformed response body: {err}: {}",
                body_preview(body)
            ))
        }
        Err(_) => {
            return AttemptOutcome::Fatal(format!(
                "error making request to Ark AI: status {status}: {}",
                body_preview(body)
            ))
        }
    };
    if let Some(error) = response.error {
        let detail = format!("{}: {}", error.code, error.message);
        if is_overload_code(&error.code) {
            return AttemptOutcome::Transient(detail);
        }
        return AttemptOutcome::Fatal(detail);
    }
    if !ok {
        return AttemptOutcome::Fatal(format!(
            "error making request to Ark AI: status {status}"
        ));
    }
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .map(AttemptOutcome::Success)
        .unwrap_or_else(|| AttemptOutcome::Fatal("no completion choices returned".to_string()))
}

impl Provider for ArkClient {
    fn configure(&mut self, config: &ProviderConfig) -> Result<(), ConfigError> {
        self.api_key = config.require(&config.password, "password")?.to_string();
        self.endpoint = config
            .require(&config.base_url, "base_url")?
            .trim_end_matches('/')
            .to_string();
        self.model = config.require(&config.model, "model")?.to_string();
        self.temperature = config.temperature;
        self.identity = config.cache_identity();
        self.agent = Some(build_agent());
        Ok(())
    }

    fn get_completion(&self, cancel: &CancelToken, prompt: &str) -> Result<String, ProviderError> {
        let agent = self.agent.as_ref().ok_or_else(|| ProviderError::NotConfigured {
            provider: ARK_CLIENT_NAME.to_string(),
        })?;
        let url = format!("{}{COMPLETIONS_PATH}", self.endpoint);
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            stream: false,
        };
        run_with_retry(ARK_CLIENT_NAME, &self.policy, cancel, |_| {
            match post_json(agent, &url, &self.api_key, &request, cancel) {
                Ok(raw) => classify(raw.status, &raw.body),
                Err(outcome) => outcome,
            }
        })
    }

    fn name(&self) -> &str {
        ARK_CLIENT_NAME
    }

    fn cache_identity(&self) -> &str {
        &self.identity
    }

    fn close(&mut self) {
        self.agent = None;
    }
}
