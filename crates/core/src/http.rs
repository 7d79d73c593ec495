//! Request and response snapshots exchanged between the host, the network
//! and the cache pools.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::hash::compute_cache_key;

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub url: Url,
}

impl Request {
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        Self { method: method.into().to_ascii_uppercase(), url }
    }

    pub fn get(url: Url) -> Self {
        Self::new("GET", url)
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Normalized cache key: method plus the URL without its fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        compute_cache_key(&self.method, url.as_str())
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    Fallback,
}

/// Immutable snapshot of a response: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Header names are stored lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>, source: ResponseSource) -> Self {
        Self { status, headers: BTreeMap::new(), body: body.into(), source }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// 2xx, the only responses worth storing.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
