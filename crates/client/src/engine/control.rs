//! Control channel.
//!
//! One-way messages from the page. Nothing is returned to the sender: bad
//! messages and failed actions are logged and dropped.

use serde_json::Value;

use medcache_core::policy::EMERGENCY_CONTACTS_PATH;
use medcache_core::{ControlMessage, Error, PoolKind, Request, Response, ResponseSource};

use super::Engine;
use crate::fetch::is_same_origin;

impl Engine {
    /// Handle one raw control message.
    pub async fn on_message(&self, raw: &Value) {
        let message = match ControlMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping control message");
                return;
            }
        };

        let kind = message.kind();
        tracing::info!(kind, "control message received");

        let result = match message {
            ControlMessage::CacheUrgent { urls } => self.cache_urgent(&urls).await,
            ControlMessage::ClearSensitive => self.clear_sensitive().await,
            ControlMessage::UpdateEmergency(payload) => self.update_emergency(&payload).await,
        };

        if let Err(e) = result {
            tracing::warn!(kind, error = %e, "control message failed");
        }
    }

    /// Fetch the given URLs straight into the Emergency pool.
    async fn cache_urgent(&self, urls: &[String]) -> Result<(), Error> {
        let mut requests = Vec::with_capacity(urls.len());
        for input in urls {
            let url = match self.resolve(input) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(url = %input, error = %e, "skipping urgent url");
                    continue;
                }
            };
            if !is_same_origin(&self.settings.origin, &url) {
                tracing::debug!(url = %url, "skipping cross-origin urgent url");
                continue;
            }
            requests.push((url.to_string(), Request::get(url)));
        }

        if requests.is_empty() {
            return Ok(());
        }

        let pool = self.store.open_pool(&self.pool_name(PoolKind::Emergency)).await?;
        for (url, result) in self.fetch_into(&pool, requests).await {
            match result {
                Ok(()) => tracing::debug!(url = %url, "urgent resource cached"),
                Err(e) => tracing::warn!(url = %url, error = %e, "urgent resource not cached"),
            }
        }
        Ok(())
    }

    async fn clear_sensitive(&self) -> Result<(), Error> {
        let deleted = self.store.delete_sensitive_pools().await?;
        for name in &deleted {
            tracing::info!(pool = %name, "cleared sensitive pool");
        }
        Ok(())
    }

    /// Overwrite the emergency contacts entry with the given payload.
    async fn update_emergency(&self, payload: &Value) -> Result<(), Error> {
        let url = self.resolve(EMERGENCY_CONTACTS_PATH)?;
        let body = serde_json::to_vec(payload)?;
        let response = Response::new(200, body, ResponseSource::Cache)
            .with_header("Content-Type", "application/json")
            .with_header("Date", chrono::Utc::now().to_rfc2822());

        let pool = self.store.open_pool(&self.pool_name(PoolKind::Emergency)).await?;
        pool.put(&Request::get(url), &response).await
    }
}
