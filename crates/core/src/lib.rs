//! Core types and shared functionality for medcache.
//!
//! This crate provides:
//! - Versioned cache pools with a SQLite backend
//! - Request classification and the per-class strategy policy table
//! - Fallback content served when network and cache both miss
//! - Control message protocol types
//! - Unified error types and configuration

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod fallback;
pub mod http;
pub mod message;
pub mod policy;

pub use cache::{CacheDb, CachedEntry, Pool, PoolKind, PoolNamespace};
pub use classify::{ResourceClass, classify};
pub use config::AppConfig;
pub use error::Error;
pub use http::{Request, Response, ResponseSource};
pub use message::ControlMessage;
pub use policy::{Strategy, StrategyPolicy};
