//! Retrieval strategies.
//!
//! | Class         | Strategy               | Pool      | Total failure        |
//! |---------------|------------------------|-----------|----------------------|
//! | Emergency     | cache-first            | Emergency | HTML page, 503       |
//! | MedicalApi    | network-first, bounded | API       | JSON error, 503      |
//! | MedicalImage  | cache-first            | Static    | SVG placeholder, 200 |
//! | Default       | stale-while-revalidate | Static    | network error        |
//!
//! Only 2xx responses are written to a pool. Non-2xx responses are returned
//! unchanged and never trigger a fallback.

use std::sync::Arc;

use medcache_core::fallback::{self, EmergencyContact};
use medcache_core::{CachedEntry, Error, Pool, Request, ResourceClass, Response, Strategy, StrategyPolicy};

use super::{Engine, store_response};

/// Synthetic content served when neither network nor cache can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    EmergencyPage,
    ApiError,
    ImagePlaceholder,
    None,
}

impl Fallback {
    fn for_class(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Emergency => Fallback::EmergencyPage,
            ResourceClass::MedicalApi => Fallback::ApiError,
            ResourceClass::MedicalImage => Fallback::ImagePlaceholder,
            ResourceClass::Default => Fallback::None,
        }
    }

    fn response(self, contact: &EmergencyContact) -> Option<Response> {
        match self {
            Fallback::EmergencyPage => Some(fallback::emergency_html(contact)),
            Fallback::ApiError => Some(fallback::api_error_json(contact)),
            Fallback::ImagePlaceholder => Some(fallback::image_placeholder_svg()),
            Fallback::None => None,
        }
    }
}

impl Engine {
    /// Serve an intercepted request according to its class policy.
    ///
    /// # Errors
    ///
    /// Only `Default` resources can fail: when the network is unreachable
    /// and nothing is cached, the network error is returned as-is.
    pub async fn handle(&self, request: &Request, class: ResourceClass) -> Result<Response, Error> {
        let policy = StrategyPolicy::for_class(class);
        let fallback = Fallback::for_class(class);

        tracing::debug!(url = %request.url, ?class, strategy = ?policy.strategy, "handling request");

        match policy.strategy {
            Strategy::CacheFirst => self.cache_first(request, policy, fallback).await,
            Strategy::NetworkFirst => self.network_first(request, policy, fallback).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request, policy, fallback).await,
        }
    }

    fn is_expired(&self, entry: &CachedEntry, policy: StrategyPolicy) -> bool {
        self.settings.enforce_max_age && entry.is_older_than(policy.max_age)
    }

    async fn cache_first(
        &self, request: &Request, policy: StrategyPolicy, fallback: Fallback,
    ) -> Result<Response, Error> {
        let pool = self.pool(policy.pool).await;

        let stale = match self.cached(pool.as_ref(), request).await {
            Some(entry) if !self.is_expired(&entry, policy) => {
                tracing::debug!(url = %request.url, "cache hit");
                return Ok(entry.response);
            }
            Some(entry) => {
                tracing::debug!(url = %request.url, stored_at = %entry.stored_at, "cached entry expired");
                Some(entry)
            }
            None => None,
        };

        self.fetch_or_fall_back(request, pool.as_ref(), stale, fallback).await
    }

    async fn network_first(
        &self, request: &Request, policy: StrategyPolicy, fallback: Fallback,
    ) -> Result<Response, Error> {
        let pool = self.pool(policy.pool).await;

        match tokio::time::timeout(self.settings.api_timeout, self.network.fetch(request)).await {
            Ok(Ok(response)) => {
                if let Some(pool) = &pool {
                    store_response(pool, request, &response).await;
                }
                return Ok(response);
            }
            Ok(Err(e)) if e.is_network_failure() => {
                tracing::warn!(url = %request.url, error = %e, "network failed, trying cache");
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                tracing::warn!(
                    url = %request.url,
                    timeout_ms = self.settings.api_timeout.as_millis() as u64,
                    "network timed out, trying cache"
                );
            }
        }

        if let Some(entry) = self.cached(pool.as_ref(), request).await {
            tracing::debug!(url = %request.url, "serving cached copy after network failure");
            return Ok(entry.response);
        }

        fallback
            .response(&self.settings.contact)
            .ok_or_else(|| Error::Network(format!("{}: unreachable and not cached", request.url)))
    }

    async fn stale_while_revalidate(
        &self, request: &Request, policy: StrategyPolicy, fallback: Fallback,
    ) -> Result<Response, Error> {
        let pool = self.pool(policy.pool).await;

        let stale = match self.cached(pool.as_ref(), request).await {
            Some(entry) if !self.is_expired(&entry, policy) => {
                tracing::debug!(url = %request.url, "cache hit, revalidating in background");
                if let Some(pool) = pool {
                    self.spawn_refresh(pool, request.clone());
                }
                return Ok(entry.response);
            }
            Some(entry) => Some(entry),
            None => None,
        };

        self.fetch_or_fall_back(request, pool.as_ref(), stale, fallback).await
    }

    /// Blocking fetch that stores on success and otherwise degrades to the
    /// stale entry, then the class fallback, then the network error.
    async fn fetch_or_fall_back(
        &self, request: &Request, pool: Option<&Pool>, stale: Option<CachedEntry>, fallback: Fallback,
    ) -> Result<Response, Error> {
        match self.network.fetch(request).await {
            Ok(response) => {
                if let Some(pool) = pool {
                    store_response(pool, request, &response).await;
                }
                Ok(response)
            }
            Err(e) if e.is_network_failure() => {
                if let Some(entry) = stale {
                    tracing::debug!(url = %request.url, "network failed, serving expired entry");
                    return Ok(entry.response);
                }
                match fallback.response(&self.settings.contact) {
                    Some(response) => {
                        tracing::warn!(url = %request.url, error = %e, "network failed, serving fallback");
                        Ok(response)
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    fn spawn_refresh(&self, pool: Pool, request: Request) {
        let network = Arc::clone(&self.network);
        self.spawn_background(async move {
            match network.fetch(&request).await {
                Ok(response) => store_response(&pool, &request, &response).await,
                Err(e) => tracing::warn!(url = %request.url, error = %e, "background refresh failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use medcache_core::{CacheDb, PoolKind, ResponseSource};

    use super::*;
    use crate::engine::FetchOutcome;
    use crate::engine::testing::{ScriptedNetwork, active_engine, engine_on, get, settings};

    async fn seed(engine: &Engine, kind: PoolKind, path: &str, body: &str) {
        let pool = engine.store().open_pool(&engine.pool_name(kind)).await.unwrap();
        let response = Response::new(200, body, ResponseSource::Network).with_header("content-type", "text/plain");
        pool.put(&get(path), &response).await.unwrap();
    }

    async fn cached_text(engine: &Engine, kind: PoolKind, path: &str) -> Option<String> {
        let pool = engine.store().open_pool(&engine.pool_name(kind)).await.unwrap();
        pool.lookup(&get(path)).await.unwrap().map(|e| e.response.text())
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let net = ScriptedNetwork::new();
        let engine = active_engine(net.clone(), "v1").await;
        let body = "<html>\u{1F691} Notruf 112</html>";
        seed(&engine, PoolKind::Emergency, "/emergency/stroke", body).await;
        net.clear_calls();

        let response = engine.handle(&get("/emergency/stroke"), ResourceClass::Emergency).await.unwrap();

        assert_eq!(response.body, body.as_bytes());
        assert_eq!(response.source, ResponseSource::Cache);
        assert!(net.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_and_stores() {
        let net = ScriptedNetwork::new();
        net.respond("/notfall/herz", 200, "text/html", "herz");
        let engine = active_engine(net.clone(), "v1").await;

        let response = engine.handle(&get("/notfall/herz"), ResourceClass::Emergency).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(cached_text(&engine, PoolKind::Emergency, "/notfall/herz").await.as_deref(), Some("herz"));
    }

    #[tokio::test]
    async fn test_emergency_offline_serves_html_fallback() {
        let net = ScriptedNetwork::new();
        let engine = active_engine(net.clone(), "v1").await;
        net.set_offline(true);

        let response = engine.handle(&get("/emergency/unknown"), ResourceClass::Emergency).await.unwrap();
        assert_eq!(response.status, 503);
        assert!(response.content_type().unwrap().starts_with("text/html"));
        assert!(response.text().contains("112"));
        assert_eq!(response.source, ResponseSource::Fallback);
    }

    #[tokio::test]
    async fn test_non_success_returned_but_not_stored() {
        let net = ScriptedNetwork::new();
        net.respond("/emergency/gone", 404, "text/html", "not found");
        let engine = active_engine(net.clone(), "v1").await;

        let response = engine.handle(&get("/emergency/gone"), ResourceClass::Emergency).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(cached_text(&engine, PoolKind::Emergency, "/emergency/gone").await, None);
    }

    #[tokio::test]
    async fn test_network_first_stores_fresh_response() {
        let net = ScriptedNetwork::new();
        net.respond("/api/faq", 200, "application/json", r#"{"faq":[1]}"#);
        let engine = active_engine(net.clone(), "v1").await;

        let response = engine.handle(&get("/api/faq"), ResourceClass::MedicalApi).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(cached_text(&engine, PoolKind::Api, "/api/faq").await.as_deref(), Some(r#"{"faq":[1]}"#));
    }

    #[tokio::test]
    async fn test_network_first_offline_uses_cache_then_json_fallback() {
        let net = ScriptedNetwork::new();
        let engine = active_engine(net.clone(), "v1").await;
        seed(&engine, PoolKind::Api, "/api/specialists", "cached specialists").await;
        net.set_offline(true);

        let cached = engine.handle(&get("/api/specialists"), ResourceClass::MedicalApi).await.unwrap();
        assert_eq!(cached.text(), "cached specialists");
        assert_eq!(cached.source, ResponseSource::Cache);

        let fallback = engine.handle(&get("/api/faq"), ResourceClass::MedicalApi).await.unwrap();
        assert_eq!(fallback.status, 503);
        assert_eq!(fallback.content_type(), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&fallback.body).unwrap();
        assert!(body["error"].is_string());
        assert_eq!(body["emergencyContact"], "112");
    }

    #[tokio::test]
    async fn test_network_first_timeout_falls_back() {
        let net = ScriptedNetwork::new();
        net.hang("/api/faq");
        let engine = active_engine(net.clone(), "v1").await;
        seed(&engine, PoolKind::Api, "/api/faq", "cached faq").await;

        let response = engine.handle(&get("/api/faq"), ResourceClass::MedicalApi).await.unwrap();
        assert_eq!(response.text(), "cached faq");
    }

    #[tokio::test]
    async fn test_image_offline_serves_placeholder() {
        let net = ScriptedNetwork::new();
        let engine = active_engine(net.clone(), "v1").await;
        net.set_offline(true);

        let response = engine.handle(&get("/doctor-photos/dr-weber.jpg"), ResourceClass::MedicalImage).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type(), Some("image/svg+xml"));
        assert_eq!(response.source, ResponseSource::Fallback);
    }

    #[tokio::test]
    async fn test_image_miss_fetches_into_static_pool() {
        let net = ScriptedNetwork::new();
        net.respond("/uploads/xray.png", 200, "image/png", "png-bytes");
        let engine = active_engine(net.clone(), "v1").await;

        engine.handle(&get("/uploads/xray.png"), ResourceClass::MedicalImage).await.unwrap();
        assert_eq!(cached_text(&engine, PoolKind::Static, "/uploads/xray.png").await.as_deref(), Some("png-bytes"));
    }

    #[tokio::test]
    async fn test_swr_serves_stale_while_refresh_in_flight() {
        let net = ScriptedNetwork::new();
        net.respond("/about", 200, "text/html", "fresh");
        let engine = active_engine(net.clone(), "v1").await;
        seed(&engine, PoolKind::Static, "/about", "stale").await;
        let gate = net.gate();

        let response = engine.handle(&get("/about"), ResourceClass::Default).await.unwrap();
        assert_eq!(response.text(), "stale");
        assert_eq!(response.source, ResponseSource::Cache);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cached_text(&engine, PoolKind::Static, "/about").await.as_deref(), Some("stale"));

        gate.add_permits(1);
        engine.settle().await;
        assert_eq!(cached_text(&engine, PoolKind::Static, "/about").await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_swr_refresh_failure_keeps_entry() {
        let net = ScriptedNetwork::new();
        let engine = active_engine(net.clone(), "v1").await;
        seed(&engine, PoolKind::Static, "/about", "stale").await;
        net.set_offline(true);

        let response = engine.handle(&get("/about"), ResourceClass::Default).await.unwrap();
        assert_eq!(response.text(), "stale");
        engine.settle().await;
        assert_eq!(cached_text(&engine, PoolKind::Static, "/about").await.as_deref(), Some("stale"));
    }

    #[tokio::test]
    async fn test_swr_miss_offline_propagates_error() {
        let net = ScriptedNetwork::new();
        let engine = active_engine(net.clone(), "v1").await;
        net.set_offline(true);

        let result = engine.handle(&get("/impressum"), ResourceClass::Default).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    fn entry_aged(body: &str, age: Duration) -> CachedEntry {
        CachedEntry {
            response: Response::new(200, body, ResponseSource::Cache),
            stored_at: chrono::Utc::now() - chrono::Duration::from_std(age).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_max_age_only_checked_when_enforced() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let net = ScriptedNetwork::new();
        let permissive = engine_on(db.clone(), net.clone(), settings("v1"));
        let strict = engine_on(db, net, crate::EngineSettings { enforce_max_age: true, ..settings("v1") });

        let policy = StrategyPolicy::for_class(ResourceClass::MedicalApi);
        let old = entry_aged("old", Duration::from_secs(10 * 60));
        let young = entry_aged("young", Duration::from_secs(60));

        assert!(!permissive.is_expired(&old, policy));
        assert!(strict.is_expired(&old, policy));
        assert!(!strict.is_expired(&young, policy));
    }

    #[tokio::test]
    async fn test_expired_entry_is_network_fallback() {
        let net = ScriptedNetwork::new();
        net.respond("/emergency", 200, "text/html", "fresh");
        let engine = active_engine(net.clone(), "v1").await;
        let pool = engine.store().open_pool("healthcare-emergency-v1").await.unwrap();
        let expired = || Some(entry_aged("expired", Duration::from_secs(2 * 24 * 60 * 60)));
        let request = get("/emergency");

        let online = engine.fetch_or_fall_back(&request, Some(&pool), expired(), Fallback::EmergencyPage);
        assert_eq!(online.await.unwrap().text(), "fresh");
        assert_eq!(cached_text(&engine, PoolKind::Emergency, "/emergency").await.as_deref(), Some("fresh"));

        net.set_offline(true);
        let offline = engine.fetch_or_fall_back(&request, Some(&pool), expired(), Fallback::EmergencyPage);
        assert_eq!(offline.await.unwrap().text(), "expired");
    }

    const TWO_DAYS: Duration = Duration::from_secs(2 * 24 * 60 * 60);

    async fn strict_engine(net: ScriptedNetwork) -> Engine {
        let db = CacheDb::open_in_memory().await.unwrap();
        let engine = engine_on(db, net, crate::EngineSettings { enforce_max_age: true, ..settings("v1") });
        engine.install().await.unwrap();
        engine.activate().await.unwrap();
        engine
    }

    async fn seed_aged(engine: &Engine, kind: PoolKind, path: &str, body: &str, age: Duration) {
        let pool = engine.store().open_pool(&engine.pool_name(kind)).await.unwrap();
        let response = Response::new(200, body, ResponseSource::Network).with_header("content-type", "text/html");
        let stored_at = chrono::Utc::now() - chrono::Duration::from_std(age).unwrap();
        pool.put_at(&get(path), &response, stored_at).await.unwrap();
    }

    async fn intercept(engine: &Engine, path: &str) -> Response {
        match engine.on_fetch(&get(path)).await.unwrap() {
            FetchOutcome::Handled(response) => response,
            FetchOutcome::Passthrough => panic!("expected {path} to be intercepted"),
        }
    }

    #[tokio::test]
    async fn test_enforced_max_age_cache_first_refetches() {
        let net = ScriptedNetwork::new();
        let engine = strict_engine(net.clone()).await;
        net.respond("/emergency", 200, "text/html", "fresh");
        seed_aged(&engine, PoolKind::Emergency, "/emergency", "expired", TWO_DAYS).await;
        net.clear_calls();

        let online = intercept(&engine, "/emergency").await;
        assert_eq!(online.text(), "fresh");
        assert_eq!(online.source, ResponseSource::Network);
        assert_eq!(net.calls(), vec!["/emergency"]);
        assert_eq!(cached_text(&engine, PoolKind::Emergency, "/emergency").await.as_deref(), Some("fresh"));

        seed_aged(&engine, PoolKind::Emergency, "/emergency", "expired", TWO_DAYS).await;
        net.set_offline(true);

        let offline = intercept(&engine, "/emergency").await;
        assert_eq!(offline.text(), "expired");
        assert_eq!(offline.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_enforced_max_age_swr_blocks_on_network() {
        let net = ScriptedNetwork::new();
        let engine = strict_engine(net.clone()).await;
        net.respond("/about", 200, "text/html", "fresh");
        seed_aged(&engine, PoolKind::Static, "/about", "expired", TWO_DAYS).await;

        let online = intercept(&engine, "/about").await;
        assert_eq!(online.text(), "fresh");
        assert_eq!(online.source, ResponseSource::Network);
        assert_eq!(cached_text(&engine, PoolKind::Static, "/about").await.as_deref(), Some("fresh"));

        seed_aged(&engine, PoolKind::Static, "/about", "expired", TWO_DAYS).await;
        net.set_offline(true);

        let offline = intercept(&engine, "/about").await;
        assert_eq!(offline.text(), "expired");
        assert_eq!(offline.source, ResponseSource::Cache);
        engine.settle().await;
    }

    #[tokio::test]
    async fn test_old_entries_served_when_max_age_not_enforced() {
        let net = ScriptedNetwork::new();
        let engine = active_engine(net.clone(), "v1").await;
        net.respond("/emergency", 200, "text/html", "fresh");
        seed_aged(&engine, PoolKind::Emergency, "/emergency", "old but kept", TWO_DAYS).await;
        net.clear_calls();

        let response = intercept(&engine, "/emergency").await;
        assert_eq!(response.text(), "old but kept");
        assert!(net.calls().is_empty());
    }
}
