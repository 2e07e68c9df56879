//! Session identity and lifecycle state.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, never-reused identifier for one feedback session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a session as tracked by the registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Endpoint reserved; the UI process is being started.
    Launching,
    /// Prompt delivered; waiting on the human.
    AwaitingResponse,
    /// A decision arrived.
    Completed,
    /// The session failed (crash, bridge error, declined).
    Failed,
    /// The session was torn down before it resolved.
    Cancelled,
}

impl SessionState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Launching,
                Self::AwaitingResponse | Self::Failed | Self::Cancelled
            ) | (
                Self::AwaitingResponse,
                Self::Completed | Self::Failed | Self::Cancelled
            )
        )
    }
}
