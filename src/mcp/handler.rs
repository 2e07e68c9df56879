//! MCP server handler, shared application state, and tool router.

use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::{
    tool::{ToolCallContext, ToolRoute, ToolRouter},
    ServerHandler,
};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use tracing::info_span;

use crate::config::GlobalConfig;
use crate::orchestrator::broker::Broker;
use crate::orchestrator::registry::SessionRegistry;
use crate::Result;

/// Shared application state accessible by all MCP tool handlers.
#[derive(Debug)]
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// Live session table, shared with the shutdown sweep.
    pub registry: SessionRegistry,
    /// Session orchestrator.
    pub broker: Broker,
}

impl AppState {
    /// Build state with a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the broker cannot be constructed.
    pub fn new(config: Arc<GlobalConfig>) -> Result<Self> {
        let registry = SessionRegistry::new();
        let broker = Broker::new(Arc::clone(&config), registry.clone())?;
        Ok(Self {
            config,
            registry,
            broker,
        })
    }
}

/// MCP server exposing the `collect_feedback` tool.
pub struct FeedbackServer {
    state: Arc<AppState>,
}

impl FeedbackServer {
    /// Create a new MCP server bound to shared application state.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Access the shared application state.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    fn tool_router() -> ToolRouter<Self> {
        let mut router = ToolRouter::new();
        router.add_route(ToolRoute::new_dyn(Self::collect_feedback_tool(), |context| {
            Box::pin(crate::mcp::tools::collect_feedback::handle(context))
        }));
        router
    }

    /// Convert a `serde_json::Value::Object` into the `Arc<Map>` expected by `Tool`.
    fn schema(value: serde_json::Value) -> Arc<serde_json::Map<String, serde_json::Value>> {
        match value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::default()),
        }
    }

    /// Every tool this server advertises.
    #[must_use]
    pub fn all_tools() -> Vec<Tool> {
        vec![Self::collect_feedback_tool()]
    }

    fn collect_feedback_tool() -> Tool {
        use crate::mcp::tools::collect_feedback::{DEFAULT_PROMPT, DEFAULT_TITLE};

        Tool::new(
            "collect_feedback",
            "Collect feedback from the user through a desktop window. Blocks until \
             the user submits text (optionally with one image) or closes the window.",
            Self::schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The message to display to the user in the feedback window",
                        "default": DEFAULT_PROMPT
                    },
                    "title": {
                        "type": "string",
                        "description": "The title of the feedback window",
                        "default": DEFAULT_TITLE
                    },
                    "time_format": {
                        "type": "string",
                        "description": "The format for time information",
                        "enum": ["full", "iso", "date", "time", "unix"],
                        "default": "full"
                    },
                    "timezone": {
                        "type": "string",
                        "description": "The IANA timezone to use (defaults to local)"
                    }
                }
            })),
        )
    }
}

impl ServerHandler for FeedbackServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = Implementation::from_build_env();
        info.instructions = Some(
            "Call collect_feedback to ask the human a question and wait for their answer."
                .into(),
        );
        info
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = std::result::Result<CallToolResult, rmcp::ErrorData>> + Send + '_ {
        let router = Self::tool_router();
        let _span = info_span!("call_tool", tool = %request.name).entered();

        async move {
            router
                .call(ToolCallContext::new(self, request, context))
                .await
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = std::result::Result<ListToolsResult, rmcp::ErrorData>> + Send + '_ {
        let tools = Self::all_tools();

        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }
}
