//! lifecycle_install and lifecycle_activate tools.

use medcache_client::Engine;
use rmcp::{ErrorData as McpError, model::CallToolResult};

use super::json_result;

/// Implementation of the lifecycle_install tool.
pub async fn install_impl(engine: &Engine) -> Result<CallToolResult, McpError> {
    let report = engine.install().await?;
    json_result(&report)
}

/// Implementation of the lifecycle_activate tool.
pub async fn activate_impl(engine: &Engine) -> Result<CallToolResult, McpError> {
    let report = engine.activate().await?;
    json_result(&report)
}
