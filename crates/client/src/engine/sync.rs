//! Background sync: refresh the medical API endpoints once connectivity
//! returns.

use serde::Serialize;

use medcache_core::policy::{SYNC_ENDPOINTS, SYNC_TAG};
use medcache_core::{Error, PoolKind, Request};

use super::Engine;

#[derive(Debug, Clone, Default, Serialize, schemars::JsonSchema)]
pub struct SyncReport {
    /// Tag was not ours; nothing was fetched.
    pub ignored: bool,
    pub refreshed: Vec<String>,
    pub failed: Vec<String>,
}

impl Engine {
    /// Handle a fired sync registration.
    ///
    /// Endpoints are refreshed independently; one failure never prevents
    /// the others from being stored. Re-running is always safe since every
    /// success is a whole-entry overwrite.
    ///
    /// # Errors
    ///
    /// Returns an error only if the API pool cannot be opened.
    pub async fn on_sync(&self, tag: &str) -> Result<SyncReport, Error> {
        if tag != SYNC_TAG {
            tracing::debug!(tag, "ignoring unknown sync tag");
            return Ok(SyncReport { ignored: true, ..Default::default() });
        }

        let pool = self.store.open_pool(&self.pool_name(PoolKind::Api)).await?;

        let mut requests = Vec::with_capacity(SYNC_ENDPOINTS.len());
        for path in SYNC_ENDPOINTS {
            requests.push((path.to_string(), Request::get(self.resolve(path)?)));
        }

        let mut report = SyncReport::default();
        for (path, result) in self.fetch_into(&pool, requests).await {
            match result {
                Ok(()) => report.refreshed.push(path),
                Err(e) => {
                    tracing::warn!(endpoint = %path, error = %e, "sync refresh failed");
                    report.failed.push(format!("{path}: {e}"));
                }
            }
        }

        tracing::info!(refreshed = report.refreshed.len(), failed = report.failed.len(), "background sync done");
        Ok(report)
    }
}
