//! Pool naming.
//!
//! Every pool name has the shape `{prefix}-{fragment}-{version}`. The prefix
//! scopes garbage collection to this engine; the version is the single tag
//! shared by all three pools of a deployment.

use serde::{Deserialize, Serialize};

/// Name fragments marking pools that may hold medical-API or patient data.
pub const SENSITIVE_POOL_FRAGMENTS: &[&str] = &["medical-api", "patient-data"];

/// The three logical pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Emergency,
    Static,
    Api,
}

impl PoolKind {
    pub const ALL: [PoolKind; 3] = [PoolKind::Emergency, PoolKind::Static, PoolKind::Api];

    pub fn fragment(self) -> &'static str {
        match self {
            PoolKind::Emergency => "emergency",
            PoolKind::Static => "static",
            PoolKind::Api => "medical-api",
        }
    }
}

/// Prefix and version from which the current pool names derive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolNamespace {
    prefix: String,
    version: String,
}

impl PoolNamespace {
    pub fn new(prefix: &str, version: &str) -> Self {
        Self { prefix: prefix.to_string(), version: version.to_string() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn pool_name(&self, kind: PoolKind) -> String {
        format!("{}-{}-{}", self.prefix, kind.fragment(), self.version)
    }

    pub fn current_names(&self) -> Vec<String> {
        PoolKind::ALL.iter().map(|kind| self.pool_name(*kind)).collect()
    }

    /// Whether `name` lives under this engine's prefix.
    pub fn owns(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('-'))
    }

    /// Owned by this engine but not one of the current version's pools.
    pub fn is_stale(&self, name: &str) -> bool {
        self.owns(name) && !self.current_names().iter().any(|current| current == name)
    }
}

/// Whether a pool name suggests it holds medical-API or patient-scoped data.
pub fn is_sensitive_pool(name: &str) -> bool {
    SENSITIVE_POOL_FRAGMENTS.iter().any(|fragment| name.contains(fragment))
}
