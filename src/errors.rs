//! Error types shared across the broker and the bridge.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering every way a feedback session can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// No free endpoint could be drawn within the retry budget.
    ResourceExhausted(String),
    /// The UI process could not be started by the operating system.
    ProcessLaunchFailed(String),
    /// The UI process never answered on its endpoint.
    BridgeUnreachable(String),
    /// The collaborator declined, cancelled, or otherwise refused to decide.
    Feedback(String),
    /// An attached image could not be loaded.
    ImageReadFailed(String),
    /// The bridge response body did not match the wire format.
    InternalProtocol(String),
    /// The UI process exited before a decision arrived.
    ProcessExited(String),
    /// The session was torn down before it resolved.
    Cancelled(String),
    /// The broker-side response ceiling elapsed.
    ResponseTimeout(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// MCP protocol or tool dispatch failure.
    Mcp(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceExhausted(msg) => write!(f, "resource exhausted: {msg}"),
            Self::ProcessLaunchFailed(msg) => write!(f, "process launch failed: {msg}"),
            Self::BridgeUnreachable(msg) => write!(f, "bridge unreachable: {msg}"),
            Self::Feedback(msg) => write!(f, "feedback: {msg}"),
            Self::ImageReadFailed(msg) => write!(f, "image read failed: {msg}"),
            Self::InternalProtocol(msg) => write!(f, "protocol: {msg}"),
            Self::ProcessExited(msg) => write!(f, "process exited: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::ResponseTimeout(msg) => write!(f, "response timeout: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Mcp(msg) => write!(f, "mcp: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
