//! Local embedded store for records buffered while offline.

pub mod schema;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, TransactionBehavior};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A record waiting to be sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedRecord {
  pub id: i64,
  pub record: Value,
  pub buffered_at: DateTime<Utc>,
}

/// Versioned SQLite database holding one record collection.
pub struct OfflineStore {
  conn: Mutex<Connection>,
  collection: String,
}

impl OfflineStore {
  /// Open or create the store at `path`, upgrading it to `version`.
  pub fn open(path: &Path, version: u32, collection: &str) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create database directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open database at {}: {}", path.display(), e))?;

    Self::with_connection(conn, version, collection)
  }

  pub fn open_in_memory(version: u32, collection: &str) -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory database: {}", e))?;

    Self::with_connection(conn, version, collection)
  }

  /// Default location of a named database
  pub fn default_path(database: &str) -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("fuelsw").join(format!("{}.sqlite", database)))
  }

  fn with_connection(conn: Connection, version: u32, collection: &str) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
      collection: collection.to_string(),
    };
    store.run_migrations(version)?;

    Ok(store)
  }

  /// Create the collection and record the schema version.
  ///
  /// Opening with a version older than the one on disk is an error.
  fn run_migrations(&self, version: u32) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let current: u32 = conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read database version: {}", e))?;

    if current > version {
      return Err(eyre!(
        "Database version {} is newer than requested version {}",
        current,
        version
      ));
    }

    conn
      .execute_batch(&schema::collection_schema(&self.collection)?)
      .map_err(|e| eyre!("Failed to run migrations: {}", e))?;

    if current < version {
      conn
        .pragma_update(None, "user_version", version)
        .map_err(|e| eyre!("Failed to set database version: {}", e))?;
    }

    Ok(())
  }

  pub fn collection(&self) -> &str {
    &self.collection
  }

  pub fn version(&self) -> Result<u32> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to read database version: {}", e))
  }

  /// Buffer a record. Returns its id.
  pub fn append(&self, record: &Value) -> Result<i64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let data =
      serde_json::to_string(record).map_err(|e| eyre!("Failed to serialize record: {}", e))?;

    conn
      .execute(
        &format!(r#"INSERT INTO "{}" (record) VALUES (?)"#, self.collection),
        params![data],
      )
      .map_err(|e| eyre!("Failed to buffer record: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  /// All records not yet marked as sent, oldest first.
  ///
  /// Read inside a deferred transaction that is never written to, so the
  /// batch is one consistent snapshot.
  pub fn pending(&self) -> Result<Vec<BufferedRecord>> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction_with_behavior(TransactionBehavior::Deferred)
      .map_err(|e| eyre!("Failed to begin read transaction: {}", e))?;

    let rows = {
      let mut stmt = tx
        .prepare(&format!(
          r#"SELECT id, record, buffered_at FROM "{}" WHERE sent_at IS NULL ORDER BY id"#,
          self.collection
        ))
        .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

      let rows = stmt
        .query_map([], |row| {
          Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
          ))
        })
        .map_err(|e| eyre!("Failed to read records: {}", e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| eyre!("Failed to read record row: {}", e))?;
      rows
    };

    tx.finish()
      .map_err(|e| eyre!("Failed to end read transaction: {}", e))?;

    rows
      .into_iter()
      .map(|(id, data, buffered_at)| {
        let record = serde_json::from_str(&data)
          .map_err(|e| eyre!("Failed to parse record {}: {}", id, e))?;
        Ok(BufferedRecord {
          id,
          record,
          buffered_at: parse_datetime(&buffered_at)?,
        })
      })
      .collect()
  }

  /// Mark records as sent so later reads skip them. Returns how many changed.
  pub fn mark_sent(&self, ids: &[i64]) -> Result<usize> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let mut updated = 0;
    {
      let mut stmt = tx
        .prepare(&format!(
          r#"UPDATE "{}" SET sent_at = datetime('now') WHERE id = ? AND sent_at IS NULL"#,
          self.collection
        ))
        .map_err(|e| eyre!("Failed to prepare update: {}", e))?;

      for id in ids {
        updated += stmt
          .execute(params![id])
          .map_err(|e| eyre!("Failed to mark record {} as sent: {}", id, e))?;
      }
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(updated)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
