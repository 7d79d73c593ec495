//! Static caching policy: which strategy and pool serve each resource class,
//! and the fixed URL lists the lifecycle, control channel and sync use.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::PoolKind;
use crate::classify::ResourceClass;

/// Paths pre-cached into the Emergency pool at install.
pub const EMERGENCY_PRECACHE: &[&str] = &["/", "/emergency", "/contact", "/data/emergency-contacts.json"];

/// Paths pre-cached into the Static pool at install.
pub const STATIC_PRECACHE: &[&str] = &[
    "/manifest.json",
    "/favicon.ico",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
    "/_next/static/css/app.css",
    "/_next/static/chunks/main.js",
];

/// Bundler output may not exist yet at install time.
pub const BUNDLER_CHUNK_MARKER: &str = "/_next/static/";

/// Emergency contacts resource overwritten by `HEALTHCARE_UPDATE_EMERGENCY`.
pub const EMERGENCY_CONTACTS_PATH: &str = "/api/emergency-contacts";

/// Endpoints refreshed into the API pool by background sync.
pub const SYNC_ENDPOINTS: &[&str] = &[EMERGENCY_CONTACTS_PATH, "/api/faq", "/api/specialists"];

/// Registration tag of the background sync task.
pub const SYNC_TAG: &str = "healthcare-data-sync";

pub fn is_bundler_chunk(path: &str) -> bool {
    path.contains(BUNDLER_CHUNK_MARKER)
}

/// Retrieval algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

/// Strategy, target pool and max-age hint for one resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyPolicy {
    pub strategy: Strategy,
    pub pool: PoolKind,
    pub max_age: Duration,
}

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

impl StrategyPolicy {
    pub const fn for_class(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Emergency => Self {
                strategy: Strategy::CacheFirst,
                pool: PoolKind::Emergency,
                max_age: Duration::from_secs(DAY),
            },
            ResourceClass::MedicalApi => Self {
                strategy: Strategy::NetworkFirst,
                pool: PoolKind::Api,
                max_age: Duration::from_secs(5 * MINUTE),
            },
            ResourceClass::MedicalImage => Self {
                strategy: Strategy::CacheFirst,
                pool: PoolKind::Static,
                max_age: Duration::from_secs(30 * DAY),
            },
            ResourceClass::Default => Self {
                strategy: Strategy::StaleWhileRevalidate,
                pool: PoolKind::Static,
                max_age: Duration::from_secs(DAY),
            },
        }
    }
}
