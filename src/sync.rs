//! Replays records buffered offline once connectivity is back.

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

use crate::config::{DatabaseConfig, SyncConfig, SyncPolicy};
use crate::db::OfflineStore;
use crate::net::{HttpRequest, SharedFetcher};

/// Request body sent to the sync endpoint.
#[derive(Debug, Serialize)]
struct SyncPayload<'a> {
  #[serde(rename = "offlineData")]
  offline_data: Vec<&'a Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  /// The tag did not match; nothing was read or sent
  Ignored,
  /// One batch was posted
  Sent {
    records: usize,
    status: u16,
    /// Records marked as sent (always 0 under best-effort)
    marked: usize,
  },
}

/// Handles sync events for one tag.
pub struct SyncTrigger {
  store: OnceCell<Arc<OfflineStore>>,
  database: DatabaseConfig,
  fetcher: SharedFetcher,
  endpoint: Url,
  tag: String,
  policy: SyncPolicy,
}

impl SyncTrigger {
  pub fn new(config: &SyncConfig, endpoint: Url, fetcher: SharedFetcher) -> Self {
    Self {
      store: OnceCell::new(),
      database: config.database.clone(),
      fetcher,
      endpoint,
      tag: config.tag.clone(),
      policy: config.policy,
    }
  }

  /// Use an already open store instead of opening the configured one.
  pub fn with_store(mut self, store: Arc<OfflineStore>) -> Self {
    self.store = OnceCell::new_with(Some(store));
    self
  }

  /// The record store, opened on first use.
  pub async fn store(&self) -> Result<Arc<OfflineStore>> {
    self
      .store
      .get_or_try_init(|| async {
        let path = self.database.db_path()?;
        let version = self.database.version;
        let collection = self.database.collection.clone();

        let store = tokio::task::spawn_blocking(move || {
          OfflineStore::open(&path, version, &collection)
        })
        .await
        .map_err(|e| eyre!("Store open task failed: {}", e))??;
        info!(
          database = %self.database.name,
          collection = store.collection(),
          version = store.version()?,
          "Opened offline store"
        );

        Ok::<_, color_eyre::Report>(Arc::new(store))
      })
      .await
      .cloned()
  }

  /// Buffer a record for the next sync.
  pub async fn buffer(&self, record: Value) -> Result<i64> {
    let store = self.store().await?;
    tokio::task::spawn_blocking(move || store.append(&record))
      .await
      .map_err(|e| eyre!("Store write task failed: {}", e))?
  }

  /// Handle a sync event.
  ///
  /// Sends every pending record in one POST. The response status is recorded
  /// but never retried; under best-effort nothing is marked, so the next sync
  /// sends the same records again.
  pub async fn handle(&self, tag: &str) -> Result<SyncOutcome> {
    if tag != self.tag {
      debug!(tag, expected = %self.tag, "Ignoring sync event");
      return Ok(SyncOutcome::Ignored);
    }

    let store = self.store().await?;
    let records = {
      let store = store.clone();
      tokio::task::spawn_blocking(move || store.pending())
        .await
        .map_err(|e| eyre!("Store read task failed: {}", e))??
    };

    let payload = SyncPayload {
      offline_data: records.iter().map(|r| &r.record).collect(),
    };
    let body =
      serde_json::to_vec(&payload).map_err(|e| eyre!("Failed to encode sync payload: {}", e))?;

    let request = HttpRequest::post_json(self.endpoint.clone(), body);
    let response = self.fetcher.fetch(&request).await?;
    info!(
      records = records.len(),
      status = response.status,
      "Sent offline data"
    );

    let marked = if self.policy == SyncPolicy::MarkSentOnSuccess && response.is_ok() {
      let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
      tokio::task::spawn_blocking(move || store.mark_sent(&ids))
        .await
        .map_err(|e| eyre!("Store update task failed: {}", e))??
    } else {
      0
    };

    Ok(SyncOutcome::Sent {
      records: records.len(),
      status: response.status,
      marked,
    })
  }
}
