//! Cache schema versioning.
//!
//! The schema version lives in SQLite's `user_version` header field. Each
//! step in [`STEPS`] moves the store up exactly one version inside its own
//! transaction, so an interrupted upgrade leaves the previous version
//! readable. A store stamped by a newer build is refused: its pools may
//! use columns this build would silently drop on the next put.

use tokio_rusqlite::{Connection, rusqlite};

use crate::Error;

/// Upgrade steps. Step `i` takes the store from version `i` to `i + 1`.
const STEPS: &[&str] = &[include_str!("../../migrations/001_pools.sql")];

/// Schema version this build reads and writes.
pub const SCHEMA_VERSION: u32 = STEPS.len() as u32;

/// Bring the store up to [`SCHEMA_VERSION`].
///
/// Returns the version the store had before the upgrade.
///
/// # Errors
///
/// Fails with `MigrationFailed` if the store is newer than this build, or
/// with the database error of the step that could not be applied.
pub(crate) async fn upgrade(conn: &Connection) -> Result<u32, Error> {
    conn.call(|conn| -> Result<u32, Error> {
        let found = stored_version(conn)?;
        if found > SCHEMA_VERSION {
            return Err(Error::MigrationFailed(format!(
                "cache schema v{found} is newer than supported v{SCHEMA_VERSION}"
            )));
        }

        for (step, sql) in STEPS.iter().enumerate().skip(found as usize) {
            let target = step as u32 + 1;
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.execute_batch(&format!("PRAGMA user_version = {target}"))?;
            tx.commit()?;
            tracing::info!(from = target - 1, to = target, "upgraded cache schema");
        }

        Ok(found)
    })
    .await
    .map_err(Error::from)
}

pub(crate) fn stored_version(conn: &rusqlite::Connection) -> Result<u32, Error> {
    let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;
    use crate::CacheDb;
    use crate::http::{Request, Response, ResponseSource};

    fn get(path: &str) -> Request {
        Request::get(Url::parse("https://praxis.example").unwrap().join(path).unwrap())
    }

    async fn version_of(db: &CacheDb) -> u32 {
        db.conn.call(|conn| stored_version(conn)).await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_store_is_stamped() {
        let conn = Connection::open_in_memory().await.unwrap();
        assert_eq!(upgrade(&conn).await.unwrap(), 0);
        assert_eq!(upgrade(&conn).await.unwrap(), SCHEMA_VERSION);

        let db = CacheDb::open_in_memory().await.unwrap();
        assert_eq!(version_of(&db).await, SCHEMA_VERSION);
        db.open_pool("healthcare-static-v1").await.unwrap();
    }

    #[tokio::test]
    async fn test_pools_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medcache.db");

        {
            let db = CacheDb::open(&path).await.unwrap();
            let pool = db.open_pool("healthcare-emergency-v1").await.unwrap();
            let response = Response::new(200, "Notruf 112", ResponseSource::Network);
            pool.put(&get("/emergency"), &response).await.unwrap();
            db.open_pool("healthcare-static-v1").await.unwrap();
        }

        let db = CacheDb::open(&path).await.unwrap();
        assert_eq!(version_of(&db).await, SCHEMA_VERSION);
        assert_eq!(db.pool_names().await.unwrap(), vec!["healthcare-emergency-v1", "healthcare-static-v1"]);

        let pool = db.open_pool("healthcare-emergency-v1").await.unwrap();
        let entry = pool.lookup(&get("/emergency")).await.unwrap().unwrap();
        assert_eq!(entry.response.text(), "Notruf 112");
    }

    #[tokio::test]
    async fn test_newer_store_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medcache.db");

        let db = CacheDb::open(&path).await.unwrap();
        let newer = SCHEMA_VERSION + 1;
        db.conn
            .call(move |conn| conn.execute_batch(&format!("PRAGMA user_version = {newer}")))
            .await
            .unwrap();
        drop(db);

        let err = CacheDb::open(&path).await.unwrap_err();
        assert!(matches!(err, Error::MigrationFailed(_)));
        assert!(err.to_string().contains(&format!("v{newer}")));
    }
}
