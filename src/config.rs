//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Program name of the bundled terminal collaborator.
pub const DEFAULT_WINDOW_COMMAND: &str = "feedback-window";

/// How the broker decides that a freshly launched UI process is listening.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Wait for the child's first stdout line.
    Handshake,
    /// Sleep for `grace_delay_ms` and assume the child is up.
    GraceDelay,
}

/// UI process launch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct WindowConfig {
    /// Collaborator program.
    pub command: String,
    /// Extra arguments passed to the collaborator.
    pub args: Vec<String>,
    /// Environment variable carrying the assigned port.
    pub port_env: String,
    /// Readiness detection strategy.
    pub readiness: Readiness,
    /// Fixed delay used by [`Readiness::GraceDelay`].
    pub grace_delay_ms: u64,
    /// Ceiling on the readiness handshake.
    pub startup_timeout_seconds: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_WINDOW_COMMAND.into(),
            args: Vec::new(),
            port_env: "MCP_SERVER_PORT".into(),
            readiness: Readiness::Handshake,
            grace_delay_ms: 1000,
            startup_timeout_seconds: 15,
        }
    }
}

/// Port range the Channel Allocator draws from (both ends inclusive).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct PortConfig {
    /// First port of the range.
    pub start: u16,
    /// Last port of the range.
    pub end: u16,
    /// Draws attempted before giving up.
    pub max_attempts: u32,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            start: 20_000,
            end: 29_999,
            max_attempts: 32,
        }
    }
}

/// Broker-side time limits.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct TimeoutConfig {
    /// Ceiling on waiting for the human; 0 means no ceiling.
    pub response_seconds: u64,
    /// How long the shutdown sweep waits for children to exit.
    pub shutdown_grace_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            response_seconds: 0,
            shutdown_grace_seconds: 5,
        }
    }
}

fn default_inactivity_text() -> String {
    "No response received within the inactivity window.".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Text substituted for an empty auto-submitted decision.
    #[serde(default = "default_inactivity_text")]
    pub inactivity_text: String,
    /// UI process launch settings.
    #[serde(default)]
    pub window: WindowConfig,
    /// Endpoint allocation range.
    #[serde(default)]
    pub ports: PortConfig,
    /// Broker-side time limits.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            inactivity_text: default_inactivity_text(),
            window: WindowConfig::default(),
            ports: PortConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Readiness handshake ceiling.
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.window.startup_timeout_seconds)
    }

    /// Fixed readiness delay for [`Readiness::GraceDelay`].
    #[must_use]
    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.window.grace_delay_ms)
    }

    /// Broker-side ceiling on the human, if one is configured.
    #[must_use]
    pub fn response_timeout(&self) -> Option<Duration> {
        (self.timeouts.response_seconds > 0)
            .then(|| Duration::from_secs(self.timeouts.response_seconds))
    }

    /// How long the shutdown sweep waits for children to exit.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.timeouts.shutdown_grace_seconds)
    }

    /// Replace the bare default collaborator name with the sibling binary
    /// installed next to `exe`, when one exists.
    pub fn resolve_window_command(&mut self, exe: &Path) {
        if self.window.command != DEFAULT_WINDOW_COMMAND {
            return;
        }
        let Some(dir) = exe.parent() else {
            return;
        };
        let sibling: PathBuf = dir.join(format!(
            "{DEFAULT_WINDOW_COMMAND}{}",
            std::env::consts::EXE_SUFFIX
        ));
        if sibling.is_file() {
            self.window.command = sibling.to_string_lossy().into_owned();
        }
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.ports.start > self.ports.end {
            return Err(AppError::Config(format!(
                "ports.start ({}) must not exceed ports.end ({})",
                self.ports.start, self.ports.end
            )));
        }

        if self.ports.start < 1024 {
            return Err(AppError::Config(
                "ports.start must be at least 1024".into(),
            ));
        }

        if self.ports.max_attempts == 0 {
            return Err(AppError::Config(
                "ports.max_attempts must be greater than zero".into(),
            ));
        }

        if self.window.command.trim().is_empty() {
            return Err(AppError::Config("window.command must not be empty".into()));
        }

        if self.window.port_env.trim().is_empty() {
            return Err(AppError::Config("window.port_env must not be empty".into()));
        }

        if self.inactivity_text.trim().is_empty() {
            return Err(AppError::Config(
                "inactivity_text must not be empty".into(),
            ));
        }

        Ok(())
    }
}
