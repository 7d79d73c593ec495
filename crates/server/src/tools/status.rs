//! cache_status tool implementation.
//!
//! Read-only view of the lifecycle state and pool contents.

use medcache_client::{Engine, LifecycleState};
use medcache_core::cache::PoolStats;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::Serialize;

use super::json_result;

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CacheStatusOutput {
    pub state: LifecycleState,
    pub version: String,
    /// Every pool in the store, including other namespaces.
    pub pools: Vec<PoolStats>,
}

/// Implementation of the cache_status tool.
pub async fn status_impl(engine: &Engine) -> Result<CallToolResult, McpError> {
    let pools = engine.store().pool_stats().await?;
    let output = CacheStatusOutput {
        state: engine.state().await,
        version: engine.settings().namespace.version().to_string(),
        pools,
    };
    json_result(&output)
}
