//! control_message tool implementation.
//!
//! Delivers a page message to the engine. Messages are one-way, so the
//! tool only acknowledges delivery; a malformed message is dropped by the
//! engine, not rejected here.

use medcache_client::Engine;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::json_result;

/// Parameters for the control_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlMessageParams {
    /// Message object, e.g. `{"type": "HEALTHCARE_CLEAR_SENSITIVE"}`.
    pub message: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlMessageOutput {
    pub delivered: bool,
}

/// Implementation of the control_message tool.
pub async fn control_impl(engine: &Engine, params: ControlMessageParams) -> Result<CallToolResult, McpError> {
    engine.on_message(&params.message).await;
    json_result(&ControlMessageOutput { delivered: true })
}
