//! `collect_feedback` MCP tool handler.
//!
//! Validates the arguments, runs one broker session, and assembles the
//! content list in fixed order: decision text, image (if any), time info.
//! Every failure becomes an error-flagged text item; nothing escapes as a
//! protocol error.

use std::sync::Arc;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::{CallToolResult, Content};
use tracing::{info, info_span, warn, Instrument};

use crate::mcp::handler::{AppState, FeedbackServer};
use crate::models::decision::{Decision, FeedbackRequest};
use crate::models::time_info::{self, TimeFormat, Zone};
use crate::{AppError, Result};

/// Prompt shown when the caller supplies none.
pub const DEFAULT_PROMPT: &str = "Please provide your feedback or describe your issue:";

/// Window title used when the caller supplies none.
pub const DEFAULT_TITLE: &str = "AI Feedback Collection";

fn default_prompt() -> String {
    DEFAULT_PROMPT.into()
}

fn default_title() -> String {
    DEFAULT_TITLE.into()
}

/// Input parameters for the `collect_feedback` tool.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CollectFeedbackInput {
    /// Message shown to the human.
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Window title.
    #[serde(default = "default_title")]
    pub title: String,
    /// Time-info block format.
    #[serde(default)]
    pub time_format: TimeFormat,
    /// IANA timezone for the time-info block.
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Default for CollectFeedbackInput {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            title: default_title(),
            time_format: TimeFormat::default(),
            timezone: None,
        }
    }
}

/// One item of the tool's content list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    /// Plain text.
    Text(String),
    /// Base64-encoded image data.
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type.
        mime_type: String,
    },
}

impl From<ContentPart> for Content {
    fn from(part: ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => Content::text(text),
            ContentPart::Image { data, mime_type } => Content::image(data, mime_type),
        }
    }
}

/// Handle the `collect_feedback` tool call.
///
/// # Errors
///
/// Never fails at the protocol level; session failures are reported as
/// error-flagged content.
pub async fn handle(
    context: ToolCallContext<'_, FeedbackServer>,
) -> std::result::Result<CallToolResult, rmcp::ErrorData> {
    let state = Arc::clone(context.service.state());
    let args: serde_json::Map<String, serde_json::Value> = context.arguments.unwrap_or_default();

    let input: CollectFeedbackInput =
        match serde_json::from_value(serde_json::Value::Object(args)) {
            Ok(input) => input,
            Err(err) => {
                return Ok(error_result(&AppError::Mcp(format!(
                    "invalid collect_feedback parameters: {err}"
                ))));
            }
        };

    let span = info_span!(
        "collect_feedback",
        title = %input.title,
        time_format = ?input.time_format,
    );

    async move {
        match run(&state, input).await {
            Ok(parts) => Ok(CallToolResult::success(
                parts.into_iter().map(Content::from).collect(),
            )),
            Err(err) => {
                warn!(%err, "collect_feedback failed");
                Ok(error_result(&err))
            }
        }
    }
    .instrument(span)
    .await
}

/// Run one feedback session and assemble its content list.
///
/// # Errors
///
/// Returns the session's [`AppError`]; the timezone is validated before any
/// process is spawned.
pub async fn run(state: &AppState, input: CollectFeedbackInput) -> Result<Vec<ContentPart>> {
    let zone = Zone::parse(input.timezone.as_deref())?;
    let format = input.time_format;

    let decision = state
        .broker
        .collect_feedback(FeedbackRequest {
            prompt: input.prompt,
            title: input.title,
            time_format: format,
            timezone: input.timezone,
        })
        .await?;

    info!(has_image = decision.has_image, "assembling feedback content");
    Ok(assemble(&decision, format, zone, Utc::now()).await)
}

/// Build `[text, image?, time-info]` for a finalized decision.
///
/// An unreadable image is replaced by a text note rather than failing.
pub async fn assemble(
    decision: &Decision,
    format: TimeFormat,
    zone: Zone,
    now: DateTime<Utc>,
) -> Vec<ContentPart> {
    let mut parts = vec![ContentPart::Text(decision.text.clone())];

    if decision.has_image {
        match load_image(decision.image()).await {
            Ok(data) => parts.push(ContentPart::Image {
                data,
                mime_type: decision.image_mime().to_owned(),
            }),
            Err(err) => {
                warn!(%err, "attached image could not be read");
                parts.push(ContentPart::Text(format!(
                    "Note: the attached image could not be loaded ({err})."
                )));
            }
        }
    }

    parts.push(ContentPart::Text(time_info::render(format, zone, now)));
    parts
}

async fn load_image(path: Option<&str>) -> Result<String> {
    let path = path.ok_or_else(|| {
        AppError::ImageReadFailed("image flagged but no image path was provided".into())
    })?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| AppError::ImageReadFailed(format!("{path}: {err}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

fn error_result(err: &AppError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!(
        "Error collecting feedback: {err}"
    ))])
}
