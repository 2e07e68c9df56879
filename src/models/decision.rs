//! Decision payload and the bridge wire format.
//!
//! Request (`POST /feedback`):
//! ```json
//! {"prompt": "...", "title": "...", "time_format": "full", "timezone": "Europe/Paris"}
//! ```
//!
//! Success response (HTTP 200), either a bare string or a decision object:
//! ```json
//! {"feedback": {"text": "...", "hasImage": true, "imagePath": "/tmp/a.png", "imageType": "image/png"}}
//! ```
//!
//! Failure response (HTTP 4xx/5xx):
//! ```json
//! {"error": "CANCELLED: Operation cancelled by user."}
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::time_info::TimeFormat;
use crate::{AppError, Result};

/// MIME type assumed when the collaborator does not report one.
pub const DEFAULT_IMAGE_TYPE: &str = "image/png";

/// Prompt delivered to the UI process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FeedbackRequest {
    /// Message shown to the human.
    pub prompt: String,
    /// Window title.
    pub title: String,
    /// Requested time-info format.
    #[serde(default)]
    pub time_format: TimeFormat,
    /// IANA timezone for the time-info block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip predicate takes a reference.
fn is_false(value: &bool) -> bool {
    !*value
}

/// The human's answer, constructed once by the collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Free-form text.
    pub text: String,
    /// Whether an image is attached.
    #[serde(default)]
    pub has_image: bool,
    /// Path of the attached image; owned by the collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    /// MIME type of the attached image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,
    /// Set when the collaborator's inactivity timer submitted on the human's behalf.
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_submitted: bool,
}

impl Decision {
    /// A text-only decision.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Attach an image, guessing the MIME type from its extension.
    #[must_use]
    pub fn with_image(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.image_type = Some(mime_for_path(Path::new(&path)).to_owned());
        self.image_path = Some(path);
        self.has_image = true;
        self
    }

    /// Path of the attached image, present only when `has_image` is set.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        if self.has_image {
            self.image_path.as_deref().filter(|p| !p.is_empty())
        } else {
            None
        }
    }

    /// MIME type of the attached image, defaulted when absent.
    #[must_use]
    pub fn image_mime(&self) -> &str {
        self.image_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_IMAGE_TYPE)
    }

    /// Normalize the text and apply the auto-submit sentinel.
    ///
    /// # Errors
    ///
    /// Returns `AppError::InternalProtocol` when the text is empty and the
    /// decision was not auto-submitted; the collaborator must never send one.
    pub fn finalize(mut self, inactivity_text: &str) -> Result<Self> {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            if !self.auto_submitted {
                return Err(AppError::InternalProtocol(
                    "collaborator sent an empty decision".into(),
                ));
            }
            self.text = inactivity_text.to_owned();
        } else if trimmed.len() != self.text.len() {
            self.text = trimmed.to_owned();
        }
        Ok(self)
    }
}

/// The `feedback` field of a success response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FeedbackPayload {
    /// Legacy shape: text only.
    Text(String),
    /// Full decision object.
    Decision(Decision),
}

impl FeedbackPayload {
    /// Convert either shape into a [`Decision`].
    #[must_use]
    pub fn into_decision(self) -> Decision {
        match self {
            Self::Text(text) => Decision::text(text),
            Self::Decision(decision) => decision,
        }
    }
}

/// Success response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedbackReply {
    /// The human's answer.
    pub feedback: FeedbackPayload,
}

/// Failure response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorReply {
    /// Human-readable reason.
    pub error: String,
}

impl ErrorReply {
    /// Construct an error body.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Guess an image MIME type from a file extension.
#[must_use]
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("svg") => "image/svg+xml",
        _ => DEFAULT_IMAGE_TYPE,
    }
}
