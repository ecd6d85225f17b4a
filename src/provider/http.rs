//! Shared HTTP plumbing for provider clients.
use super::AttemptOutcome;
use crate::cancel::{CancelReason, CancelToken};
use crate::util::truncate_string;
use serde::Serialize;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for one provider round trip when the token has no deadline.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);
const BODY_PREVIEW_BYTES: usize = 500;

/// Agent that reports non-2xx responses as responses, not errors, so the
/// provider can read structured error payloads.
pub(crate) fn build_agent() -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(REQUEST_TIMEOUT))
        .build();
    ureq::Agent::new_with_config(config)
}

/// Raw HTTP result handed to a provider's classifier.
pub(crate) struct RawResponse {
    pub(crate) status: u16,
    pub(crate) body: String,
}

/// POST a JSON body with a bearer token, bounded by the token's deadline.
///
/// The round trip runs on a worker thread. When the token is cancelled the
/// caller stops waiting at once and the worker is left to finish against its
/// own timeout, its result discarded.
pub(crate) fn post_json<T: Serialize>(
    agent: &ureq::Agent,
    url: &str,
    bearer: &str,
    body: &T,
    cancel: &CancelToken,
) -> Result<RawResponse, AttemptOutcome> {
    let timeout = request_timeout(cancel).map_err(AttemptOutcome::Cancelled)?;
    let payload = serde_json::to_value(body)
        .map_err(|err| AttemptOutcome::Fatal(format!("encode request body: {err}")))?;
    let worker_agent = agent.clone();
    let worker_url = url.to_string();
    let authorization = format!("Bearer {bearer}");
    let start = Instant::now();

    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let result = send(&worker_agent, &worker_url, &authorization, &payload, timeout);
        let _ = sender.send(result);
    });
    let result = loop {
        match receiver.recv_timeout(CANCEL_POLL_INTERVAL) {
            Ok(result) => break result,
            Err(RecvTimeoutError::Timeout) => {
                if let Some(reason) = cancel.check() {
                    tracing::debug!(url, %reason, "abandoning in-flight provider request");
                    return Err(AttemptOutcome::Cancelled(reason));
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(AttemptOutcome::Fatal(
                    "provider request worker exited without a result".to_string(),
                ))
            }
        }
    };

    let (status, text) = result.map_err(|err| transport_outcome(&err, cancel))?;
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        status,
        response_bytes = text.len(),
        "provider request complete"
    );
    Ok(RawResponse { status, body: text })
}

fn send(
    agent: &ureq::Agent,
    url: &str,
    authorization: &str,
    payload: &serde_json::Value,
    timeout: Duration,
) -> Result<(u16, String), ureq::Error> {
    let mut response = agent
        .post(url)
        .config()
        .timeout_global(Some(timeout))
        .build()
        .header("Authorization", authorization)
        .header("Accept", "application/json")
        .send_json(payload)?;
    let status = response.status().as_u16();
    let text = response.body_mut().read_to_string()?;
    Ok((status, text))
}

fn request_timeout(cancel: &CancelToken) -> Result<Duration, CancelReason> {
    if let Some(reason) = cancel.check() {
        return Err(reason);
    }
    match cancel.remaining() {
        Some(remaining) if remaining.is_zero() => Err(CancelReason::DeadlineExceeded),
        Some(remaining) => Ok(remaining.min(REQUEST_TIMEOUT)),
        None => Ok(REQUEST_TIMEOUT),
    }
}

/// Transport failures are fatal unless the token explains them.
fn transport_outcome(err: &ureq::Error, cancel: &CancelToken) -> AttemptOutcome {
    if let Some(reason) = cancel.check() {
        return AttemptOutcome::Cancelled(reason);
    }
    AttemptOutcome::Fatal(format!("transport error: {err}"))
}

/// Short body excerpt for error messages.
pub(crate) fn body_preview(body: &str) -> String {
    truncate_string(body.trim(), BODY_PREVIEW_BYTES)
}
