//! MCP server handler implementation.
//!
//! The host owns one engine and turns each tool call into the matching
//! engine event.

use std::sync::Arc;

use medcache_client::{Engine, Network};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::{
    BackgroundSyncParams, ControlMessageParams, ResourceFetchParams, activate_impl, control_impl, fetch_impl,
    install_impl, status_impl, sync_impl,
};

/// The main MCP server handler for medcache.
#[derive(Clone)]
pub struct MedcacheHost {
    engine: Arc<Engine>,
    network: Arc<dyn Network>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MedcacheHost {
    /// Create a new server handler around an engine and the network it uses.
    pub fn new(engine: Arc<Engine>, network: Arc<dyn Network>) -> Self {
        Self { engine, network, tool_router: Self::tool_router() }
    }

    #[tool(description = "Install the current version: open the pools and pre-cache emergency and static resources.")]
    async fn lifecycle_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.engine).await
    }

    #[tool(description = "Activate the installed version: delete pools of older versions and start intercepting.")]
    async fn lifecycle_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.engine).await
    }

    /// Fetch a resource as the page would.
    ///
    /// Requests the engine does not intercept are performed by the host.
    #[tool(
        description = "Fetch a resource through the caching engine. Returns status, headers, body and whether it came from network, cache or fallback."
    )]
    async fn resource_fetch(&self, params: Parameters<ResourceFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.engine, self.network.as_ref(), params.0).await
    }

    #[tool(
        description = "Send a one-way control message: HEALTHCARE_CACHE_URGENT, HEALTHCARE_CLEAR_SENSITIVE or HEALTHCARE_UPDATE_EMERGENCY."
    )]
    async fn control_message(&self, params: Parameters<ControlMessageParams>) -> Result<CallToolResult, McpError> {
        control_impl(&self.engine, params.0).await
    }

    #[tool(description = "Fire a background sync registration. Tag healthcare-data-sync refreshes the medical API pool.")]
    async fn background_sync(&self, params: Parameters<BackgroundSyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.engine, params.0).await
    }

    #[tool(description = "Show the lifecycle state and entry counts for every cache pool.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.engine).await
    }
}

impl ServerHandler for MedcacheHost {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "medcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
