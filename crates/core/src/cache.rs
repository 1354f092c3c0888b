//! Key/value cache for dashboard aggregates and master data.
//!
//! Entries live in the `cache_entries` table so the server and the maintenance CLI share them:
//! `hms cache clear` in one process invalidates what the server reads. Expiry is a stored
//! timestamp checked on read; there is no other invalidation.

use crate::db::{fmt_datetime, now, Database};
use crate::{HmsError, HmsResult};
use api_shared::dto::CacheStatsRes;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct CacheService {
    db: Database,
    ttl: Option<chrono::Duration>,
}

impl CacheService {
    /// A zero `ttl` stores entries without expiry.
    pub fn new(db: Database, ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() {
            None
        } else {
            chrono::Duration::from_std(ttl).ok()
        };
        Self { db, ttl }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> HmsResult<Option<T>> {
        self.get_at(key, now())
    }

    pub fn get_at<T: DeserializeOwned>(
        &self,
        key: &str,
        at: NaiveDateTime,
    ) -> HmsResult<Option<T>> {
        let raw: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM cache_entries
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, fmt_datetime(&at)],
                |row| row.get(0),
            )
            .optional()
            .map_err(HmsError::from)
        })?;

        match raw {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    // Shape changed between releases; treat as a miss.
                    tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    pub fn put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> HmsResult<()> {
        self.put_at(key, value, now())
    }

    pub fn put_at<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        at: NaiveDateTime,
    ) -> HmsResult<()> {
        let raw = serde_json::to_string(value).map_err(HmsError::Serialization)?;
        let expires_at = self.ttl.map(|ttl| fmt_datetime(&(at + ttl)));
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO cache_entries (key, value, stored_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    stored_at = excluded.stored_at,
                    expires_at = excluded.expires_at",
                params![key, raw, fmt_datetime(&at), expires_at],
            )?;
            Ok(())
        })
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// `compute` runs with its own connection lock; it must not call back into the cache.
    pub fn remember<T, F>(&self, key: &str, compute: F) -> HmsResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Connection) -> HmsResult<T>,
    {
        if let Some(hit) = self.get(key)? {
            tracing::debug!(key, "cache hit");
            return Ok(hit);
        }
        tracing::debug!(key, "cache miss");
        let value = self.db.with_conn(compute)?;
        self.put(key, &value)?;
        Ok(value)
    }

    pub fn forget(&self, key: &str) -> HmsResult<bool> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
            Ok(affected > 0)
        })
    }

    /// Remove every entry, or only those whose key starts with `prefix`.
    pub fn clear(&self, prefix: Option<&str>) -> HmsResult<usize> {
        let removed = self.db.with_conn(|conn| {
            let affected = match prefix {
                Some(prefix) => conn.execute(
                    "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
                    params![prefix],
                )?,
                None => conn.execute("DELETE FROM cache_entries", [])?,
            };
            Ok(affected)
        })?;
        tracing::info!(removed, prefix = prefix.unwrap_or("*"), "cache cleared");
        Ok(removed)
    }

    pub fn stats(&self) -> HmsResult<CacheStatsRes> {
        self.stats_at(now())
    }

    pub fn stats_at(&self, at: NaiveDateTime) -> HmsResult<CacheStatsRes> {
        self.db.with_conn(|conn| {
            let entries: i64 =
                conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
            let expired: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cache_entries
                 WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![fmt_datetime(&at)],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare("SELECT key FROM cache_entries ORDER BY key")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(CacheStatsRes {
                entries,
                expired,
                keys,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::parse_datetime;

    fn cache(ttl_secs: u64) -> CacheService {
        CacheService::new(Database::open_in_memory().unwrap(), Duration::from_secs(ttl_secs))
    }

    #[test]
    fn remember_computes_once() {
        let cache = cache(60);
        let first: Vec<i64> = cache.remember("k", |_| Ok(vec![1, 2])).unwrap();
        let second: Vec<i64> = cache
            .remember("k", |_| Ok(vec![9]))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = cache(60);
        let t0 = parse_datetime("2024-05-01 10:00:00").unwrap();
        cache.put_at("k", &"v", t0).unwrap();

        let fresh: Option<String> = cache.get_at("k", t0 + chrono::Duration::seconds(59)).unwrap();
        assert_eq!(fresh.as_deref(), Some("v"));
        let stale: Option<String> = cache.get_at("k", t0 + chrono::Duration::seconds(60)).unwrap();
        assert_eq!(stale, None);

        let stats = cache.stats_at(t0 + chrono::Duration::seconds(61)).unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.expired, 1);
    }

    #[test]
    fn zero_ttl_never_expires() {
        let cache = cache(0);
        let t0 = parse_datetime("2024-05-01 10:00:00").unwrap();
        cache.put_at("k", &1, t0).unwrap();
        let later: Option<i64> = cache
            .get_at("k", t0 + chrono::Duration::days(365))
            .unwrap();
        assert_eq!(later, Some(1));
    }

    #[test]
    fn clear_by_prefix_is_literal() {
        let cache = cache(60);
        cache.put("master:drugs", &1).unwrap();
        cache.put("master:wards", &1).unwrap();
        cache.put("masterXdrugs", &1).unwrap();
        cache.put("dashboard:bed_occupancy", &1).unwrap();

        assert_eq!(cache.clear(Some("master:")).unwrap(), 2);
        assert_eq!(
            cache.stats().unwrap().keys,
            vec!["dashboard:bed_occupancy".to_string(), "masterXdrugs".to_string()]
        );
        assert_eq!(cache.clear(None).unwrap(), 2);
    }

    #[test]
    fn undecodable_entry_is_a_miss() {
        let cache = cache(60);
        cache.put("k", &"text").unwrap();
        let value: Option<Vec<i64>> = cache.get("k").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn forget_reports_whether_key_existed() {
        let cache = cache(60);
        cache.put("k", &1).unwrap();
        assert!(cache.forget("k").unwrap());
        assert!(!cache.forget("k").unwrap());
    }
}
