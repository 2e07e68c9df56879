//! MCP tool handlers.

pub mod collect_feedback;
