//! Coze bot chat client.
//!
//! The bot API answers HTTP 200 for most failures and reports them through
//! `code`/`msg` in the body. A busy bot answers with "There are too many users
//! now", the only signal this client retries.
use super::http::{body_preview, build_agent, post_json};
use super::{run_with_retry, AttemptOutcome, Provider, ProviderError, RetryPolicy};
use crate::cancel::CancelToken;
use crate::config::{ConfigError, ProviderConfig};
use serde::{Deserialize, Serialize};

pub const COZE_BOT_CLIENT_NAME: &str = "cozebot";

const DEFAULT_BASE_URL: &str = "https://api.coze.com";
const DEFAULT_USER: &str = "manifester";
const CHAT_PATH: &str = "/open_api/v2/chat";
const OVERLOADED_MARKER: &str = "There are too many users now";

#[derive(Default)]
pub struct CozeBotClient {
    agent: Option<ureq::Agent>,
    identity: String,
    base_url: String,
    token: String,
    bot_id: String,
    conversation_id: String,
    user: String,
    policy: RetryPolicy,
}

impl CozeBotClient {
    /// Override the retry policy (tests shorten the delay).
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    conversation_id: &'a str,
    bot_id: &'a str,
    user: &'a str,
    query: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    role: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    messages: Vec<ChatMessage>,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Map one HTTP exchange onto an attempt outcome.
pub(crate) fn classify(status: u16, body: &str) -> AttemptOutcome {
    if !(200..300).contains(&status) {
        return AttemptOutcome::Fatal(format!(
            "received non-OK response status {status}: {}",
            body_preview(body)
        ));
    }
    let response: ChatResponse = match serde_json::from_str(body) {
        Ok(response) => response,
        Err(err) => {
            return AttemptOutcome::Fatal(format!(
                "malformed response body: {err}: {}",
                body_preview(body)
            ))
        }
    };
    if response.code != 0 {
        if response.msg.contains(OVERLOADED_MARKER) {
            return AttemptOutcome::Transient(response.msg);
        }
        return AttemptOutcome::Fatal(format!(
            "received error from server (code {}): {}",
            response.code, response.msg
        ));
    }
    response
        .messages
        .into_iter()
        .find(|message| {
            message.role == "assistant"
                && message.kind == "answer"
                && !message.content.trim().is_empty()
        })
        .map(|message| AttemptOutcome::Success(message.content))
        .unwrap_or_else(|| AttemptOutcome::Fatal("no answer found in response".to_string()))
}

impl Provider for CozeBotClient {
    fn configure(&mut self, config: &ProviderConfig) -> Result<(), ConfigError> {
        self.token = config.require(&config.password, "password")?.to_string();
        self.bot_id = config.require(&config.bot_id, "bot_id")?.to_string();
        self.base_url = config
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        self.user = config
            .user
            .clone()
            .filter(|user| !user.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USER.to_string());
        self.conversation_id = config
            .conversation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("{DEFAULT_USER}-{}", std::process::id()));
        self.identity = config.cache_identity();
        self.agent = Some(build_agent());
        Ok(())
    }

    fn get_completion(&self, cancel: &CancelToken, prompt: &str) -> Result<String, ProviderError> {
        let agent = self.agent.as_ref().ok_or_else(|| ProviderError::NotConfigured {
            provider: COZE_BOT_CLIENT_NAME.to_string(),
        })?;
        let url = format!("{}{CHAT_PATH}", self.base_url);
        let request = ChatRequest {
            conversation_id: &self.conversation_id,
            bot_id: &self.bot_id,
            user: &self.user,
            query: prompt,
            stream: false,
        };
        run_with_retry(COZE_BOT_CLIENT_NAME, &self.policy, cancel, |attempt| {
            tracing::debug!(attempt, prompt_bytes = prompt.len(), "coze chat request");
            match post_json(agent, &url, &self.token, &request, cancel) {
                Ok(raw) => classify(raw.status, &raw.body),
                Err(outcome) => outcome,
            }
        })
    }

    fn name(&self) -> &str {
        COZE_BOT_CLIENT_NAME
    }

    fn cache_identity(&self) -> &str {
        &self.identity
    }

    fn close(&mut self) {
        self.agent = None;
    }
}

#[cfg(test)]
#[path = "coze_tests.rs"]
mod tests;
