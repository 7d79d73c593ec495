//! resource_fetch tool implementation.
//!
//! Runs one request through the engine. When the engine declines to
//! intercept it (not active yet, non-GET, cross-origin), the host performs
//! the request itself, as a page would without the engine.

use std::collections::BTreeMap;

use medcache_client::fetch::resolve;
use medcache_client::{Engine, FetchOutcome, Network};
use medcache_core::{Error, Request, ResponseSource};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::HostError;

/// Input parameters for resource_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceFetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for resource_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResourceFetchOutput {
    /// The resolved URL.
    pub url: String,
    /// Whether the engine produced the response.
    pub intercepted: bool,
    pub source: ResponseSource,
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy for binary content).
    pub body: String,
    pub body_bytes: usize,
}

/// Implementation of the resource_fetch tool.
pub async fn fetch_impl(
    engine: &Engine, network: &dyn Network, params: ResourceFetchParams,
) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(HostError::InvalidInput("url cannot be empty".into()).into());
    }

    let url = resolve(&engine.settings().origin, &params.url)
        .map_err(|e| Error::InvalidUrl(format!("{}: {e}", params.url)))?;
    let request = Request::new(params.method, url);

    let (intercepted, response) = match engine.on_fetch(&request).await? {
        FetchOutcome::Handled(response) => (true, response),
        FetchOutcome::Passthrough => {
            tracing::debug!(url = %request.url, method = %request.method, "passthrough");
            (false, network.fetch(&request).await?)
        }
    };

    let output = ResourceFetchOutput {
        url: request.url.to_string(),
        intercepted,
        source: response.source,
        status: response.status,
        content_type: response.content_type().map(str::to_string),
        body: response.text(),
        body_bytes: response.body.len(),
        headers: response.headers,
    };
    json_result(&output)
}
