//! The interception engine.
//!
//! An [`Engine`] owns the store handle, the network seam and the lifecycle
//! state of one deployed version. The host calls its five entry points
//! (install, activate, fetch, message, sync) directly or through
//! [`Engine::dispatch`].
//!
//! ### Concurrency
//! - Each host event runs as its own task; handlers only yield at store and
//!   network calls.
//! - Pools are shared by every writer. Each write is a whole-entry
//!   overwrite of one key, so no locking is needed around pool data.
//! - Stale-while-revalidate refreshes run detached on an engine-owned
//!   `JoinSet`. They outlive the request that spawned them and are aborted
//!   when the engine is dropped.

pub mod control;
pub mod lifecycle;
pub mod strategy;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use url::Url;

use medcache_core::classify::classify;
use medcache_core::fallback::EmergencyContact;
use medcache_core::{AppConfig, CacheDb, CachedEntry, Error, Pool, PoolKind, PoolNamespace, Request, Response};

use crate::fetch::{Network, is_same_origin, resolve};

pub use lifecycle::{ActivateReport, InstallReport, LifecycleState};
pub use sync::SyncReport;

/// Engine settings derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub origin: Url,
    pub namespace: PoolNamespace,
    pub api_timeout: Duration,
    pub enforce_max_age: bool,
    pub contact: EmergencyContact,
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;
        Ok(Self {
            origin,
            namespace: config.namespace(),
            api_timeout: config.api_timeout(),
            enforce_max_age: config.enforce_max_age,
            contact: EmergencyContact {
                emergency_number: config.emergency_number.clone(),
                on_call_number: config.on_call_number.clone(),
            },
        })
    }
}

/// Host-invoked entry points.
#[derive(Debug, Clone)]
pub enum Event {
    Install,
    Activate,
    Fetch(Request),
    Message(Value),
    Sync(String),
}

/// What the engine decided to do with an intercepted fetch.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The engine produced the response.
    Handled(Response),
    /// Not intercepted; the host performs the request itself.
    Passthrough,
}

/// Result of a dispatched event.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivateReport),
    Fetched(FetchOutcome),
    MessageHandled,
    Synced(SyncReport),
}

/// Result of fetching one URL into a pool.
pub(crate) type PrecacheResult = (String, Result<(), Error>);

pub struct Engine {
    store: CacheDb,
    network: Arc<dyn Network>,
    settings: EngineSettings,
    state: RwLock<LifecycleState>,
    background: Mutex<JoinSet<()>>,
}

impl Engine {
    pub fn new(store: CacheDb, network: Arc<dyn Network>, settings: EngineSettings) -> Self {
        Self {
            store,
            network,
            settings,
            state: RwLock::new(LifecycleState::Parsed),
            background: Mutex::new(JoinSet::new()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &CacheDb {
        &self.store
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    async fn set_state(&self, state: LifecycleState) {
        *self.state.write().await = state;
    }

    /// Route a host event to its handler.
    pub async fn dispatch(&self, event: Event) -> Result<EventOutcome, Error> {
        match event {
            Event::Install => self.install().await.map(EventOutcome::Installed),
            Event::Activate => self.activate().await.map(EventOutcome::Activated),
            Event::Fetch(request) => self.on_fetch(&request).await.map(EventOutcome::Fetched),
            Event::Message(raw) => {
                self.on_message(&raw).await;
                Ok(EventOutcome::MessageHandled)
            }
            Event::Sync(tag) => self.on_sync(&tag).await.map(EventOutcome::Synced),
        }
    }

    /// Intercept a fetch.
    ///
    /// Only GET requests to the configured origin are handled, and only once
    /// activation has claimed clients. Everything else passes through.
    pub async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome, Error> {
        if self.state().await != LifecycleState::Active {
            tracing::debug!(url = %request.url, "engine not active, passing through");
            return Ok(FetchOutcome::Passthrough);
        }

        if !request.is_get() || !is_same_origin(&self.settings.origin, &request.url) {
            return Ok(FetchOutcome::Passthrough);
        }

        let class = classify(request.url.as_str());
        self.handle(request, class).await.map(FetchOutcome::Handled)
    }

    /// Wait for all background refreshes spawned so far.
    pub async fn settle(&self) {
        let mut pending = {
            let mut guard = self.background.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };

        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "background task did not complete");
            }
        }
    }

    pub(crate) fn spawn_background<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut set = self.background.lock().unwrap_or_else(PoisonError::into_inner);
        while set.try_join_next().is_some() {}
        set.spawn(task);
    }

    pub(crate) fn resolve(&self, input: &str) -> Result<Url, Error> {
        resolve(&self.settings.origin, input).map_err(|e| Error::InvalidUrl(format!("{input}: {e}")))
    }

    pub(crate) fn pool_name(&self, kind: PoolKind) -> String {
        self.settings.namespace.pool_name(kind)
    }

    /// Open a pool, degrading to `None` if the store is unavailable.
    pub(crate) async fn pool(&self, kind: PoolKind) -> Option<Pool> {
        let name = self.pool_name(kind);
        match self.store.open_pool(&name).await {
            Ok(pool) => Some(pool),
            Err(e) => {
                tracing::warn!(pool = %name, error = %e, "pool unavailable, treating as cache miss");
                None
            }
        }
    }

    /// Read an entry, treating store errors as a miss.
    pub(crate) async fn cached(&self, pool: Option<&Pool>, request: &Request) -> Option<CachedEntry> {
        let pool = pool?;
        match pool.lookup(request).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(pool = pool.name(), url = %request.url, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Fetch each request and store successful responses in `pool`.
    ///
    /// Requests run as independent tasks; one failure never blocks the
    /// others. Results come back sorted by label.
    pub(crate) async fn fetch_into(&self, pool: &Pool, requests: Vec<(String, Request)>) -> Vec<PrecacheResult> {
        let mut tasks = JoinSet::new();

        for (label, request) in requests {
            let network = Arc::clone(&self.network);
            let pool = pool.clone();
            tasks.spawn(async move {
                let result = fetch_and_store(network.as_ref(), &pool, &request).await;
                (label, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!(error = %e, "fetch task did not complete"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }
}

/// Store a response if it is cacheable, logging instead of failing.
pub(crate) async fn store_response(pool: &Pool, request: &Request, response: &Response) {
    if !response.is_ok() {
        tracing::debug!(url = %request.url, status = response.status, "not caching non-success response");
        return;
    }
    if let Err(e) = pool.put(request, response).await {
        tracing::warn!(pool = pool.name(), url = %request.url, error = %e, "cache write failed");
    }
}

async fn fetch_and_store(network: &dyn Network, pool: &Pool, request: &Request) -> Result<(), Error> {
    let response = network.fetch(request).await?;
    if !response.is_ok() {
        return Err(Error::HttpError(format!("{} returned status {}", request.url, response.status)));
    }
    pool.put(request, &response).await
}
