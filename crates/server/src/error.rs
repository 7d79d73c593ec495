//! Host-side errors for the medcache server.
//!
//! Engine failures arrive as `medcache_core::Error` and convert on their
//! own; these cover what the tool layer itself can get wrong.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Invalid tool arguments (e.g., an empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Tool output could not be serialized.
    #[error("SERIALIZE_FAILED: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<HostError> for McpError {
    fn from(err: HostError) -> Self {
        let code = match &err {
            HostError::InvalidInput(_) => -32602,
            HostError::Serialize(_) => -32000,
        };

        McpError { code: ErrorCode(code), message: err.to_string().into(), data: None }
    }
}
