//! Client side of medcache.
//!
//! This crate provides the network seam with its reqwest-backed client and
//! the interception engine: strategies, lifecycle, control channel and
//! background sync.

pub mod engine;
pub mod fetch;

pub use engine::{
    ActivateReport, Engine, EngineSettings, Event, EventOutcome, FetchOutcome, InstallReport, LifecycleState,
    SyncReport,
};

pub use fetch::{FetchClient, FetchConfig, Network};
