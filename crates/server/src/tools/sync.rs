//! background_sync tool implementation.

use medcache_client::Engine;
use medcache_core::policy::SYNC_TAG;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the background_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackgroundSyncParams {
    /// Registration tag that fired (default: "healthcare-data-sync").
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_tag() -> String {
    SYNC_TAG.into()
}

/// Implementation of the background_sync tool.
pub async fn sync_impl(engine: &Engine, params: BackgroundSyncParams) -> Result<CallToolResult, McpError> {
    let report = engine.on_sync(&params.tag).await?;
    json_result(&report)
}
