#![forbid(unsafe_code)]

//! Human-in-the-loop feedback broker exposed as an MCP tool.

pub mod bridge;
pub mod config;
pub mod errors;
pub mod mcp;
pub mod models;
pub mod orchestrator;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
