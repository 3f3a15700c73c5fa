//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::{CachedEntry, RequestKey};
use crate::net::{HttpResponse, ResponseKind};

/// Trait for cache storage backends.
///
/// Every call is atomic on its own. Nothing coordinates separate calls, so two
/// writers racing on one key leave whichever wrote last.
pub trait CacheStorage: Send + Sync + 'static {
  /// Create the bucket if it does not exist yet.
  fn open_bucket(&self, bucket: &str) -> Result<()>;

  /// Names of all existing buckets, oldest first.
  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Delete a bucket and all of its entries. Returns false if it did not exist.
  fn delete_bucket(&self, bucket: &str) -> Result<bool>;

  /// Exact-match lookup of a request in a bucket.
  fn get(&self, bucket: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Store a response, creating the bucket if needed.
  fn put(&self, bucket: &str, key: &RequestKey, response: &HttpResponse) -> Result<()>;

  /// Store several responses in one transaction: either all land or none do.
  fn put_all(&self, bucket: &str, entries: &[(RequestKey, HttpResponse)]) -> Result<()>;

  /// Request keys stored in a bucket.
  fn keys(&self, bucket: &str) -> Result<Vec<RequestKey>>;
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory cache.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;

    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per named bucket
CREATE TABLE IF NOT EXISTS cache_buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses keyed by bucket and request hash
CREATE TABLE IF NOT EXISTS cache_entries (
    bucket TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    response_url TEXT NOT NULL,
    status INTEGER NOT NULL,
    kind TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, key_hash)
);
"#;

fn insert_entry(
  conn: &Connection,
  bucket: &str,
  key: &RequestKey,
  response: &HttpResponse,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
      params![bucket],
    )
    .map_err(|e| eyre!("Failed to create bucket {}: {}", bucket, e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (bucket, key_hash, method, url, response_url, status, kind, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        bucket,
        key.cache_hash(),
        key.method,
        key.url,
        response.url,
        response.status,
        response.kind.as_str(),
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store {} {}: {}", key.method, key.url, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open_bucket(&self, bucket: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
        params![bucket],
      )
      .map_err(|e| eyre!("Failed to open bucket {}: {}", bucket, e))?;

    Ok(())
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_buckets ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read bucket name: {}", e))?;

    Ok(names)
  }

  fn delete_bucket(&self, bucket: &str) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute("DELETE FROM cache_entries WHERE bucket = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete entries of {}: {}", bucket, e))?;

    let removed = tx
      .execute("DELETE FROM cache_buckets WHERE name = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", bucket, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn get(&self, bucket: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT response_url, status, kind, headers, body, cached_at FROM cache_entries
         WHERE bucket = ? AND key_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(String, u16, String, String, Vec<u8>, String)> = stmt
      .query_row(params![bucket, key.cache_hash()], |row| {
        Ok((
          row.get(0)?,
          row.get(1)?,
          row.get(2)?,
          row.get(3)?,
          row.get(4)?,
          row.get(5)?,
        ))
      })
      .optional()
      .map_err(|e| eyre!("Failed to look up {} {}: {}", key.method, key.url, e))?;

    match row {
      Some((url, status, kind, headers, body, cached_at_str)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

        Ok(Some(CachedEntry {
          response: HttpResponse {
            url,
            status,
            headers,
            body,
            kind: ResponseKind::parse(&kind)?,
          },
          cached_at: parse_datetime(&cached_at_str)?,
        }))
      }
      None => Ok(None),
    }
  }

  fn put(&self, bucket: &str, key: &RequestKey, response: &HttpResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    insert_entry(&conn, bucket, key, response)
  }

  fn put_all(&self, bucket: &str, entries: &[(RequestKey, HttpResponse)]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, response) in entries {
      insert_entry(&tx, bucket, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn keys(&self, bucket: &str) -> Result<Vec<RequestKey>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT method, url FROM cache_entries WHERE bucket = ? ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![bucket], |row| {
        Ok(RequestKey {
          method: row.get(0)?,
          url: row.get(1)?,
        })
      })
      .map_err(|e| eyre!("Failed to list keys of {}: {}", bucket, e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read key: {}", e))?;

    Ok(keys)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
