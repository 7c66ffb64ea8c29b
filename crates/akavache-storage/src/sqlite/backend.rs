//! SQLite-backed [`CacheBackend`], bit-compatible with existing
//! Akavache SQLite deployments.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use akavache_core::{ticks, CacheBackend, CacheEntry, CacheError};

type ConnectionPool = Pool<SqliteConnectionManager>;

/// Configuration for [`SqliteBackend::open`].
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub max_connections: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self { max_connections: 4 }
    }
}

/// SQLite-backed blob store. Every public method dispatches its blocking
/// rusqlite call onto [`tokio::task::spawn_blocking`] so the async
/// runtime is never blocked on disk I/O.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: ConnectionPool,
}

impl SqliteBackend {
    /// Open (creating if absent) a SQLite-backed cache file.
    pub fn open(path: impl AsRef<Path>, config: SqliteConfig) -> Result<Self, CacheError> {
        let manager = SqliteConnectionManager::file(path.as_ref());
        Self::from_manager(manager, config)
    }

    /// Open an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, CacheError> {
        Self::from_manager(SqliteConnectionManager::memory(), SqliteConfig::default())
    }

    fn from_manager(manager: SqliteConnectionManager, config: SqliteConfig) -> Result<Self, CacheError> {
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .build(manager)
            .map_err(|e| CacheError::Io(e.to_string()))?;

        {
            let conn = pool.get().map_err(|e| CacheError::Io(e.to_string()))?;
            initialize_schema(&conn)?;
        }

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, CacheError> {
        self.pool.get().map_err(|e| CacheError::Io(e.to_string()))
    }
}

/// Creates the `CacheEntry` table if absent, and migrates rows out of a
/// legacy `CacheElement` table name (see DESIGN.md's Open Question
/// decision on schema migration) by renaming it in place.
fn initialize_schema(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
    .map_err(|e| CacheError::Io(e.to_string()))?;

    let legacy_exists: bool = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='CacheElement'",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map_err(|e| CacheError::Io(e.to_string()))?
        > 0;

    if legacy_exists {
        conn.execute("ALTER TABLE CacheElement RENAME TO CacheEntry", [])
            .map_err(|e| CacheError::Io(e.to_string()))?;
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS CacheEntry (
            Key TEXT PRIMARY KEY NOT NULL,
            TypeName TEXT NULL,
            Value BLOB NOT NULL,
            CreatedAt INTEGER NOT NULL,
            Expiration INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS CacheEntry_TypeName ON CacheEntry (TypeName);",
    )
    .map_err(|e| CacheError::Io(e.to_string()))?;

    Ok(())
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CacheEntry> {
    let key: String = row.get(0)?;
    let type_name: Option<String> = row.get(1)?;
    let value: Vec<u8> = row.get(2)?;
    let created_at: i64 = row.get(3)?;
    let expiration: i64 = row.get(4)?;

    Ok(CacheEntry {
        key,
        type_tag: type_name,
        payload: Bytes::from(value),
        created_at: ticks::from_ticks(created_at),
        expires_at: ticks::from_ticks(expiration),
    })
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn insert(&self, entry: CacheEntry) -> Result<(), CacheError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| CacheError::Io(e.to_string()))?;
            conn.execute(
                "INSERT INTO CacheEntry (Key, TypeName, Value, CreatedAt, Expiration)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(Key) DO UPDATE SET
                    TypeName = excluded.TypeName,
                    Value = excluded.Value,
                    CreatedAt = excluded.CreatedAt,
                    Expiration = excluded.Expiration",
                params![
                    entry.key,
                    entry.type_tag,
                    entry.payload.as_ref(),
                    ticks::to_ticks(entry.created_at),
                    ticks::to_ticks(entry.expires_at),
                ],
            )
            .map_err(|e| CacheError::Io(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }

    async fn insert_bulk(&self, entries: Vec<CacheEntry>) -> Result<(), CacheError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CacheError::Io(e.to_string()))?;
            let tx = conn.transaction().map_err(|e| CacheError::Io(e.to_string()))?;
            for entry in &entries {
                tx.execute(
                    "INSERT INTO CacheEntry (Key, TypeName, Value, CreatedAt, Expiration)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(Key) DO UPDATE SET
                        TypeName = excluded.TypeName,
                        Value = excluded.Value,
                        CreatedAt = excluded.CreatedAt,
                        Expiration = excluded.Expiration",
                    params![
                        entry.key,
                        entry.type_tag,
                        entry.payload.as_ref(),
                        ticks::to_ticks(entry.created_at),
                        ticks::to_ticks(entry.expires_at),
                    ],
                )
                .map_err(|e| CacheError::Io(e.to_string()))?;
            }
            tx.commit().map_err(|e| CacheError::Io(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }

    async fn get(&self, key: &str, type_tag: Option<&str>) -> Result<Option<CacheEntry>, CacheError> {
        let pool = self.pool.clone();
        let key = key.to_string();
        let type_tag = type_tag.map(str::to_string);
        let now = Utc::now();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| CacheError::Io(e.to_string()))?;
            let entry: Option<CacheEntry> = conn
                .query_row(
                    "SELECT Key, TypeName, Value, CreatedAt, Expiration FROM CacheEntry WHERE Key = ?1",
                    params![key],
                    row_to_entry,
                )
                .optional()
                .map_err(|e| CacheError::Io(e.to_string()))?;

            match entry {
                Some(entry) if type_tag.is_some() && entry.type_tag != type_tag => Ok(None),
                Some(entry) if entry.is_expired(now) => Ok(None),
                other => Ok(other),
            }
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }

    async fn get_bulk(
        &self,
        keys: &[String],
        type_tag: Option<&str>,
    ) -> Result<Vec<Option<CacheEntry>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let pool = self.pool.clone();
        let keys = keys.to_vec();
        let type_tag = type_tag.map(str::to_string);
        let now = Utc::now();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| CacheError::Io(e.to_string()))?;
            let placeholders = vec!["?"; keys.len()].join(", ");
            let sql = format!(
                "SELECT Key, TypeName, Value, CreatedAt, Expiration FROM CacheEntry WHERE Key IN ({placeholders})"
            );
            let mut stmt = conn.prepare(&sql).map_err(|e| CacheError::Io(e.to_string()))?;
            let rows = stmt
                .query_map(params_from_iter(keys.iter()), row_to_entry)
                .map_err(|e| CacheError::Io(e.to_string()))?;

            let mut by_key = std::collections::HashMap::new();
            for row in rows {
                let entry = row.map_err(|e| CacheError::Io(e.to_string()))?;
                if type_tag.is_some() && entry.type_tag != type_tag {
                    continue;
                }
                if entry.is_expired(now) {
                    continue;
                }
                by_key.insert(entry.key.clone(), entry);
            }

            Ok(keys.iter().map(|k| by_key.get(k).cloned()).collect())
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }

    async fn get_all_keys(&self, type_tag: Option<&str>) -> Result<Vec<String>, CacheError> {
        let pool = self.pool.clone();
        let type_tag = type_tag.map(str::to_string);
        let now_ticks = ticks::to_ticks(Utc::now());
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| CacheError::Io(e.to_string()))?;
            let (sql, use_type) = match &type_tag {
                Some(_) => (
                    "SELECT Key FROM CacheEntry WHERE TypeName = ?1 AND Expiration > ?2",
                    true,
                ),
                None => ("SELECT Key FROM CacheEntry WHERE Expiration > ?1", false),
            };
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| CacheError::Enumeration(e.to_string()))?;

            let keys = if use_type {
                stmt.query_map(params![type_tag, now_ticks], |row| row.get::<_, String>(0))
            } else {
                stmt.query_map(params![now_ticks], |row| row.get::<_, String>(0))
            }
            .map_err(|e| CacheError::Enumeration(e.to_string()))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| CacheError::Enumeration(e.to_string()))?;

            Ok(keys)
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }

    async fn get_created_at(
        &self,
        key: &str,
        type_tag: Option<&str>,
    ) -> Result<Option<DateTime<Utc>>, CacheError> {
        Ok(self.get(key, type_tag).await?.map(|entry| entry.created_at))
    }

    async fn invalidate(&self, key: &str, type_tag: Option<&str>) -> Result<(), CacheError> {
        let pool = self.pool.clone();
        let key = key.to_string();
        let type_tag = type_tag.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| CacheError::Io(e.to_string()))?;
            match type_tag {
                Some(tag) => conn.execute(
                    "DELETE FROM CacheEntry WHERE Key = ?1 AND TypeName = ?2",
                    params![key, tag],
                ),
                None => conn.execute("DELETE FROM CacheEntry WHERE Key = ?1", params![key]),
            }
            .map_err(|e| CacheError::Io(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }

    async fn invalidate_bulk(&self, keys: &[String], type_tag: Option<&str>) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let pool = self.pool.clone();
        let keys = keys.to_vec();
        let type_tag = type_tag.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get().map_err(|e| CacheError::Io(e.to_string()))?;
            let tx = conn.transaction().map_err(|e| CacheError::Io(e.to_string()))?;
            let placeholders = vec!["?"; keys.len()].join(", ");
            let sql = match &type_tag {
                Some(_) => format!(
                    "DELETE FROM CacheEntry WHERE Key IN ({placeholders}) AND TypeName = ?{}",
                    keys.len() + 1
                ),
                None => format!("DELETE FROM CacheEntry WHERE Key IN ({placeholders})"),
            };
            let mut params: Vec<&dyn rusqlite::ToSql> = keys.iter().map(|k| k as &dyn rusqlite::ToSql).collect();
            if let Some(tag) = &type_tag {
                params.push(tag);
            }
            tx.execute(&sql, params.as_slice()).map_err(|e| CacheError::Io(e.to_string()))?;
            tx.commit().map_err(|e| CacheError::Io(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }

    async fn invalidate_all(&self, type_tag: Option<&str>) -> Result<(), CacheError> {
        let pool = self.pool.clone();
        let type_tag = type_tag.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| CacheError::Io(e.to_string()))?;
            match type_tag {
                Some(tag) => conn.execute("DELETE FROM CacheEntry WHERE TypeName = ?1", params![tag]),
                None => conn.execute("DELETE FROM CacheEntry", []),
            }
            .map_err(|e| CacheError::Io(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }

    async fn vacuum(&self) -> Result<(), CacheError> {
        let pool = self.pool.clone();
        let now_ticks = ticks::to_ticks(Utc::now());
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| CacheError::Io(e.to_string()))?;
            conn.execute("DELETE FROM CacheEntry WHERE Expiration <= ?1", params![now_ticks])
                .map_err(|e| CacheError::Io(e.to_string()))?;
            conn.execute_batch("VACUUM;").map_err(|e| CacheError::Io(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Internal(e.to_string()))?
    }

    async fn flush(&self, _type_tag: Option<&str>) -> Result<(), CacheError> {
        // Every statement above commits (or runs in autocommit mode)
        // before its future resolves; durability is per-op already.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn entry(key: &str, type_tag: Option<&str>, payload: &[u8]) -> CacheEntry {
        CacheEntry::new(key, type_tag.map(str::to_string), Bytes::copy_from_slice(payload))
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.insert(entry("k", None, b"v1")).await.unwrap();

        let got = backend.get("k", None).await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from_static(b"v1"));
    }

    #[tokio::test]
    async fn overwrite_on_conflict() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.insert(entry("k", None, b"a")).await.unwrap();
        backend.insert(entry("k", None, b"b")).await.unwrap();

        let got = backend.get("k", None).await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from_static(b"b"));
    }

    #[tokio::test]
    async fn expired_entry_reads_as_missing() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let mut e = entry("k", None, b"v");
        e.expires_at = Utc::now() - ChronoDuration::seconds(1);
        backend.insert(e).await.unwrap();

        assert!(backend.get("k", None).await.unwrap().is_none());
        assert!(backend.get_all_keys(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bulk_insert_is_atomic_round_trip() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let entries = vec![entry("a", None, b"1"), entry("b", None, b"2")];
        backend.insert_bulk(entries).await.unwrap();

        assert_eq!(backend.get("a", None).await.unwrap().unwrap().payload, Bytes::from_static(b"1"));
        assert_eq!(backend.get("b", None).await.unwrap().unwrap().payload, Bytes::from_static(b"2"));
    }

    #[tokio::test]
    async fn bulk_insert_rolls_back_every_row_on_a_mid_batch_failure() {
        let backend = SqliteBackend::open_in_memory().unwrap();

        // A trigger that rejects one specific key lets the test force a
        // failure partway through a batch without relying on any
        // constraint reachable through `CacheEntry`'s own fields.
        {
            let conn = backend.conn().unwrap();
            conn.execute_batch(
                "CREATE TRIGGER reject_poison BEFORE INSERT ON CacheEntry
                 WHEN NEW.Key = 'poison'
                 BEGIN SELECT RAISE(ABORT, 'rejected for test'); END;",
            )
            .unwrap();
        }

        let entries = vec![entry("a", None, b"1"), entry("poison", None, b"2"), entry("b", None, b"3")];
        assert!(backend.insert_bulk(entries).await.is_err());

        // Rows ordered before the poisoned one in the same transaction
        // must not have survived either.
        assert!(backend.get("a", None).await.unwrap().is_none());
        assert!(backend.get("poison", None).await.unwrap().is_none());
        assert!(backend.get("b", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vacuum_removes_only_expired() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let mut expired = entry("expired", None, b"x");
        expired.expires_at = Utc::now() - ChronoDuration::seconds(1);
        backend.insert(expired).await.unwrap();
        backend.insert(entry("live", None, b"y")).await.unwrap();

        backend.vacuum().await.unwrap();

        let keys = backend.get_all_keys(None).await.unwrap();
        assert_eq!(keys, vec!["live".to_string()]);
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend.invalidate("missing", None).await.unwrap();
    }

    #[tokio::test]
    async fn reopen_same_file_survives_dispose() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let backend = SqliteBackend::open(&path, SqliteConfig::default()).unwrap();
            backend.insert(entry("k", None, b"v")).await.unwrap();
        }

        let backend = SqliteBackend::open(&path, SqliteConfig::default()).unwrap();
        let got = backend.get("k", None).await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from_static(b"v"));
    }
}
