//! Schema for the offline record store.

use color_eyre::{eyre::eyre, Result};

/// Build the schema for one record collection.
///
/// Collection names become table names, so they are restricted to ASCII
/// letters, digits and underscores.
pub fn collection_schema(collection: &str) -> Result<String> {
  validate_collection(collection)?;

  Ok(format!(
    r#"
-- Buffered records written while offline
CREATE TABLE IF NOT EXISTS "{collection}" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    record TEXT NOT NULL,
    buffered_at TEXT NOT NULL DEFAULT (datetime('now')),
    sent_at TEXT
);

CREATE INDEX IF NOT EXISTS "idx_{collection}_pending"
    ON "{collection}"(sent_at);
"#
  ))
}

pub fn validate_collection(collection: &str) -> Result<()> {
  let valid = !collection.is_empty()
    && collection
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_');

  if valid {
    Ok(())
  } else {
    Err(eyre!("Invalid collection name '{}'", collection))
  }
}
