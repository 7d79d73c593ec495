//! MCP tool implementations.
//!
//! One module per host event, plus the read-only `cache_status`
//! diagnostic. Every tool answers with pretty-printed JSON text.

pub mod control;
pub mod lifecycle;
pub mod resource;
pub mod status;
pub mod sync;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::HostError;

pub use control::{ControlMessageParams, control_impl};
pub use lifecycle::{activate_impl, install_impl};
pub use resource::{ResourceFetchParams, fetch_impl};
pub use status::status_impl;
pub use sync::{BackgroundSyncParams, sync_impl};

pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(HostError::from)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
