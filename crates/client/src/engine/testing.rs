//! Scripted network and engine builders for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use url::Url;

use medcache_core::fallback::EmergencyContact;
use medcache_core::{CacheDb, Error, PoolNamespace, Request, Response, ResponseSource};

use super::{Engine, EngineSettings};
use crate::fetch::Network;

pub(crate) const ORIGIN: &str = "https://praxis.example";

#[derive(Debug, Clone)]
enum Route {
    Respond { status: u16, content_type: String, body: String },
    Fail,
    Hang,
}

#[derive(Default)]
struct Script {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

/// In-process [`Network`] answering by URL path.
///
/// Unscripted paths answer 404.
#[derive(Clone, Default)]
pub(crate) struct ScriptedNetwork {
    script: Arc<Script>,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, path: &str, status: u16, content_type: &str, body: &str) {
        let route = Route::Respond { status, content_type: content_type.into(), body: body.into() };
        self.script.routes.lock().unwrap().insert(path.into(), route);
    }

    pub(crate) fn fail(&self, path: &str) {
        self.script.routes.lock().unwrap().insert(path.into(), Route::Fail);
    }

    pub(crate) fn hang(&self, path: &str) {
        self.script.routes.lock().unwrap().insert(path.into(), Route::Hang);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.script.offline.store(offline, Ordering::SeqCst);
    }

    /// Hold every later fetch until a permit is added to the returned gate.
    pub(crate) fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.script.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Paths requested so far, in call order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.script.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.script.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let path = request.url.path().to_string();
        self.script.calls.lock().unwrap().push(path.clone());

        let gate = self.script.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        if self.script.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{}: offline", request.url)));
        }

        let route = self.script.routes.lock().unwrap().get(&path).cloned();
        match route {
            Some(Route::Respond { status, content_type, body }) => {
                Ok(Response::new(status, body, ResponseSource::Network).with_header("Content-Type", content_type))
            }
            Some(Route::Fail) => Err(Error::Network(format!("{}: connection reset", request.url))),
            Some(Route::Hang) => std::future::pending().await,
            None => Ok(Response::new(404, "not found", ResponseSource::Network)),
        }
    }
}

pub(crate) fn get(path: &str) -> Request {
    Request::get(Url::parse(ORIGIN).unwrap().join(path).unwrap())
}

pub(crate) fn settings(version: &str) -> EngineSettings {
    EngineSettings {
        origin: Url::parse(ORIGIN).unwrap(),
        namespace: PoolNamespace::new("healthcare", version),
        api_timeout: Duration::from_millis(200),
        enforce_max_age: false,
        contact: EmergencyContact::default(),
    }
}

pub(crate) fn engine_on(db: CacheDb, network: ScriptedNetwork, settings: EngineSettings) -> Engine {
    Engine::new(db, Arc::new(network), settings)
}

pub(crate) async fn engine_with(network: ScriptedNetwork, version: &str) -> (Engine, CacheDb) {
    let db = CacheDb::open_in_memory().await.unwrap();
    (engine_on(db.clone(), network, settings(version)), db)
}

/// Engine that has been installed and activated.
pub(crate) async fn active_engine(network: ScriptedNetwork, version: &str) -> Engine {
    let (engine, _) = engine_with(network, version).await;
    engine.install().await.unwrap();
    engine.activate().await.unwrap();
    engine
}
