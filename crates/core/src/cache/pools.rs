//! Pool and entry operations.
//!
//! A pool is a named key-value store of response snapshots. Entries are
//! keyed by the normalized request and replaced wholesale on every put;
//! each put is one SQLite transaction, so concurrent writers to the same
//! key never leave a torn entry behind.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::CacheDb;
use super::namespace::{PoolNamespace, is_sensitive_pool};
use crate::Error;
use crate::http::{Request, Response, ResponseSource};

/// A response read back from a pool, with the time it was stored.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub response: Response,
    pub stored_at: DateTime<Utc>,
}

impl CachedEntry {
    /// True when the entry has outlived `max_age`.
    pub fn is_older_than(&self, max_age: Duration) -> bool {
        let age = Utc::now() - self.stored_at;
        age.to_std().is_ok_and(|age| age > max_age)
    }
}

/// Entry count per pool, for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PoolStats {
    pub name: String,
    pub entries: u64,
    pub created_at: String,
}

/// Handle to one named pool.
///
/// Holding a handle does not pin the pool: if it is deleted, the next
/// `put` recreates it.
#[derive(Clone, Debug)]
pub struct Pool {
    db: CacheDb,
    name: String,
}

impl CacheDb {
    /// Open (creating if needed) the pool with the given name.
    pub async fn open_pool(&self, name: &str) -> Result<Pool, Error> {
        let pool_name = name.to_string();
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO pools (name, created_at) VALUES (?1, ?2)",
                    params![pool_name, created_at],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
            .map_err(|e| Error::PoolUnavailable(format!("{name}: {e}")))?;

        Ok(Pool { db: self.clone(), name: name.to_string() })
    }

    /// Whether a pool with this name exists.
    pub async fn has_pool(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn
                    .query_row("SELECT EXISTS(SELECT 1 FROM pools WHERE name = ?1)", params![name], |row| {
                        row.get(0)
                    })
                    .map_err(Error::from)?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Names of every pool, in name order.
    pub async fn pool_names(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM pools ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a pool and all of its entries.
    ///
    /// Returns false if no such pool existed.
    pub async fn delete_pool(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM pools WHERE name = ?1", params![name])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every pool under the namespace prefix whose name is not one
    /// of the current version's pools. Other namespaces are left alone.
    ///
    /// Returns the deleted pool names.
    pub async fn delete_stale(&self, namespace: &PoolNamespace) -> Result<Vec<String>, Error> {
        let namespace = namespace.clone();
        self.delete_where(move |name| namespace.is_stale(name)).await
    }

    /// Delete every pool whose name contains `medical-api` or `patient-data`.
    ///
    /// Returns the deleted pool names.
    pub async fn delete_sensitive_pools(&self) -> Result<Vec<String>, Error> {
        self.delete_where(is_sensitive_pool).await
    }

    async fn delete_where<F>(&self, predicate: F) -> Result<Vec<String>, Error>
    where
        F: Fn(&str) -> bool + Send + 'static,
    {
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let names = {
                    let mut stmt = tx.prepare("SELECT name FROM pools ORDER BY name")?;
                    stmt.query_map([], |row| row.get::<_, String>(0))?
                        .collect::<Result<Vec<String>, rusqlite::Error>>()?
                };

                let mut deleted = Vec::new();
                for name in names.into_iter().filter(|name| predicate(name)) {
                    tx.execute("DELETE FROM pools WHERE name = ?1", params![name])?;
                    deleted.push(name);
                }
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(Error::from)
    }

    /// Entry counts for every pool.
    pub async fn pool_stats(&self) -> Result<Vec<PoolStats>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<PoolStats>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT p.name, p.created_at, COUNT(e.key)
                     FROM pools p LEFT JOIN entries e ON e.pool = p.name
                     GROUP BY p.name, p.created_at
                     ORDER BY p.name",
                )?;
                let stats = stmt
                    .query_map([], |row| {
                        Ok(PoolStats { name: row.get(0)?, created_at: row.get(1)?, entries: row.get::<_, i64>(2)? as u64 })
                    })?
                    .collect::<Result<Vec<PoolStats>, rusqlite::Error>>()?;
                Ok(stats)
            })
            .await
            .map_err(Error::from)
    }
}

impl Pool {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a response under the request's key, replacing any previous entry.
    ///
    /// Only GET requests can be stored.
    pub async fn put(&self, request: &Request, response: &Response) -> Result<(), Error> {
        self.put_at(request, response, Utc::now()).await
    }

    /// Like [`Pool::put`], recording `stored_at` as the entry's age anchor.
    pub async fn put_at(&self, request: &Request, response: &Response, stored_at: DateTime<Utc>) -> Result<(), Error> {
        if !request.is_get() {
            return Err(Error::InvalidInput(format!("only GET requests are cached, got {}", request.method)));
        }

        let pool = self.name.clone();
        let key = request.cache_key();
        let method = request.method.clone();
        let url = request.url.to_string();
        let status = response.status as i64;
        let headers_json = serde_json::to_string(&response.headers)?;
        let body = response.body.clone();
        let stored_at = stored_at.to_rfc3339();

        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO pools (name, created_at) VALUES (?1, ?2)",
                    params![pool, stored_at],
                )?;
                tx.execute(
                    "INSERT INTO entries (pool, key, method, url, status, headers_json, body, stored_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(pool, key) DO UPDATE SET
                        method = excluded.method,
                        url = excluded.url,
                        status = excluded.status,
                        headers_json = excluded.headers_json,
                        body = excluded.body,
                        stored_at = excluded.stored_at",
                    params![pool, key, method, url, status, headers_json, body, stored_at],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up the entry for a request.
    ///
    /// Returns None on a miss. The response is marked as coming from cache.
    pub async fn lookup(&self, request: &Request) -> Result<Option<CachedEntry>, Error> {
        let pool = self.name.clone();
        let key = request.cache_key();

        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<(i64, String, Vec<u8>, String)>, Error> {
                let result = conn.query_row(
                    "SELECT status, headers_json, body, stored_at FROM entries WHERE pool = ?1 AND key = ?2",
                    params![pool, key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                );

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        let Some((status, headers_json, body, stored_at)) = row else {
            return Ok(None);
        };

        let headers: BTreeMap<String, String> = serde_json::from_str(&headers_json)?;
        let stored_at = DateTime::parse_from_rfc3339(&stored_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let response = Response { status: status as u16, headers, body, source: ResponseSource::Cache };
        Ok(Some(CachedEntry { response, stored_at }))
    }

    /// URLs of every entry in the pool, in URL order.
    pub async fn urls(&self) -> Result<Vec<String>, Error> {
        let pool = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE pool = ?1 ORDER BY url")?;
                let urls = stmt
                    .query_map(params![pool], |row| row.get(0))?
                    .collect::<Result<Vec<String>, rusqlite::Error>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn len(&self) -> Result<u64, Error> {
        let pool = self.name.clone();
        self.db
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE pool = ?1", params![pool], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
