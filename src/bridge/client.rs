//! Broker side of the bridge.
//!
//! Sends exactly one `POST /feedback` and maps the reply. There are no
//! retries: a human is on the other end, and a second attempt would show a
//! stale or duplicate window.

use std::net::SocketAddr;

use tracing::{debug, info};

use super::FEEDBACK_PATH;
use crate::models::decision::{Decision, ErrorReply, FeedbackReply, FeedbackRequest};
use crate::{AppError, Result};

/// HTTP client for the per-session endpoint.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
}

impl BridgeClient {
    /// Build a client. No request timeout is set; the human may take as long
    /// as they need.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP stack cannot be initialized.
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|err| AppError::Config(format!("failed to build bridge client: {err}")))?;
        Ok(Self { http })
    }

    /// Deliver the prompt and wait for the decision.
    ///
    /// # Errors
    ///
    /// - `AppError::BridgeUnreachable`: connection refused, reset, or dropped.
    /// - `AppError::Feedback`: the collaborator answered with an error status.
    /// - `AppError::InternalProtocol`: a success status with an unparseable body.
    pub async fn deliver(&self, endpoint: SocketAddr, request: &FeedbackRequest) -> Result<Decision> {
        let url = format!("http://{endpoint}{FEEDBACK_PATH}");
        debug!(%url, "delivering prompt");

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|err| AppError::BridgeUnreachable(format!("{url}: {err}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AppError::BridgeUnreachable(format!("reply from {url} dropped: {err}")))?;

        info!(status = status.as_u16(), "bridge replied");
        parse_reply(status.as_u16(), &body)
    }
}

/// Map a raw bridge reply onto a decision or a typed failure.
///
/// # Errors
///
/// See [`BridgeClient::deliver`].
pub fn parse_reply(status: u16, body: &str) -> Result<Decision> {
    if (200..300).contains(&status) {
        let reply: FeedbackReply = serde_json::from_str(body).map_err(|err| {
            AppError::InternalProtocol(format!("invalid response from ui process: {err}"))
        })?;
        return Ok(reply.feedback.into_decision());
    }

    match serde_json::from_str::<ErrorReply>(body) {
        Ok(reply) => Err(AppError::Feedback(reply.error)),
        Err(_) => Err(AppError::Feedback(format!("HTTP error {status}: {body}"))),
    }
}
