//! Install and activate.
//!
//! Install opens the Emergency and Static pools and pre-caches the fixed
//! URL lists. Activate retires pools left behind by older versions and then
//! claims clients, after which fetches are intercepted.

use serde::Serialize;

use medcache_core::policy::{EMERGENCY_PRECACHE, STATIC_PRECACHE, is_bundler_chunk};
use medcache_core::{Error, PoolKind, Request};

use super::{Engine, PrecacheResult};

/// Lifecycle position of one engine version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Active,
}

#[derive(Debug, Clone, Default, Serialize, schemars::JsonSchema)]
pub struct InstallReport {
    /// URLs now present in a pool.
    pub cached: Vec<String>,
    /// URLs that could not be fetched, with the reason.
    pub failed: Vec<String>,
    /// Bundler output skipped at install.
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, schemars::JsonSchema)]
pub struct ActivateReport {
    /// Pools removed because they belong to another version.
    pub deleted: Vec<String>,
}

impl Engine {
    /// Open the versioned pools and pre-cache the emergency and static
    /// resources.
    ///
    /// Individual resources may fail without failing the install. Install
    /// ends by skipping the waiting phase, so activation can follow at once.
    /// An already active engine stays active and keeps intercepting while
    /// the pools are refreshed.
    ///
    /// # Errors
    ///
    /// Returns an error if either pool cannot be opened.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let previous = self.state().await;
        if previous != LifecycleState::Active {
            self.set_state(LifecycleState::Installing).await;
        }
        tracing::info!(version = self.settings.namespace.version(), ?previous, "installing");

        let pools = async {
            let emergency = self.store.open_pool(&self.pool_name(PoolKind::Emergency)).await?;
            let statics = self.store.open_pool(&self.pool_name(PoolKind::Static)).await?;
            Ok::<_, Error>((emergency, statics))
        };
        let (emergency, statics) = match pools.await {
            Ok(pools) => pools,
            Err(e) => {
                tracing::warn!(error = %e, "install aborted, pools unavailable");
                self.set_state(previous).await;
                return Err(e);
            }
        };

        let mut report = InstallReport::default();
        let emergency_requests = self.precache_requests(EMERGENCY_PRECACHE, &mut report);
        let static_requests = self.precache_requests(STATIC_PRECACHE, &mut report);

        let (emergency_results, static_results) = tokio::join!(
            self.fetch_into(&emergency, emergency_requests),
            self.fetch_into(&statics, static_requests)
        );
        record(&mut report, emergency_results.into_iter().chain(static_results));

        // skip waiting
        let next = match previous {
            LifecycleState::Active => LifecycleState::Active,
            _ => LifecycleState::Installed,
        };
        self.set_state(next).await;

        tracing::info!(
            cached = report.cached.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "install complete"
        );
        Ok(report)
    }

    /// Delete pools of other versions in this namespace, then claim clients.
    ///
    /// # Errors
    ///
    /// Fails with `LIFECYCLE_ERROR` before a completed install, or with the
    /// store error if the stale pools cannot be enumerated or deleted.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        let previous = self.state().await;
        if matches!(previous, LifecycleState::Parsed | LifecycleState::Installing) {
            return Err(Error::Lifecycle(format!("cannot activate while {previous:?}")));
        }

        self.set_state(LifecycleState::Activating).await;

        let deleted = match self.store.delete_stale(&self.settings.namespace).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.set_state(previous).await;
                return Err(e);
            }
        };

        for name in &deleted {
            tracing::info!(pool = %name, "deleted stale pool");
        }

        // claim clients
        self.set_state(LifecycleState::Active).await;
        tracing::info!(version = self.settings.namespace.version(), "active");

        Ok(ActivateReport { deleted })
    }

    fn precache_requests(&self, paths: &[&str], report: &mut InstallReport) -> Vec<(String, Request)> {
        let mut requests = Vec::with_capacity(paths.len());
        for path in paths {
            if is_bundler_chunk(path) {
                tracing::debug!(path, "skipping bundler chunk");
                report.skipped.push(path.to_string());
                continue;
            }
            match self.resolve(path) {
                Ok(url) => requests.push((url.to_string(), Request::get(url))),
                Err(e) => report.failed.push(format!("{path}: {e}")),
            }
        }
        requests
    }
}

fn record(report: &mut InstallReport, results: impl Iterator<Item = PrecacheResult>) {
    for (url, result) in results {
        match result {
            Ok(()) => report.cached.push(url),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "pre-cache failed");
                report.failed.push(format!("{url}: {e}"));
            }
        }
    }
}
