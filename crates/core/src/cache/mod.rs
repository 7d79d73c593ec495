//! SQLite-backed cache pools.
//!
//! This module provides the store behind the three named, versioned pools
//! (Emergency, Static, API) using SQLite with async access via
//! tokio-rusqlite. It supports:
//!
//! - Request-keyed entries using SHA-256 over method and URL
//! - Versioned schema upgrades that refuse stores from newer builds
//! - WAL mode for concurrent access
//! - Version-scoped garbage collection of stale pools

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod namespace;
pub mod pools;

pub use crate::Error;

pub use connection::CacheDb;
pub use namespace::{PoolKind, PoolNamespace, SENSITIVE_POOL_FRAGMENTS, is_sensitive_pool};
pub use pools::{CachedEntry, Pool, PoolStats};
