//! Handle to one named cache bucket.

use color_eyre::Result;
use std::sync::Arc;

use super::storage::CacheStorage;
use super::{CachedEntry, RequestKey};
use crate::net::HttpResponse;

/// A named bucket in a shared storage backend.
///
/// Handlers receive this instead of reaching for a global cache, so the bucket
/// name is plain configuration.
pub struct CacheBucket<S: CacheStorage> {
  storage: Arc<S>,
  name: String,
}

impl<S: CacheStorage> CacheBucket<S> {
  pub fn new(storage: Arc<S>, name: impl Into<String>) -> Self {
    Self {
      storage,
      name: name.into(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn storage(&self) -> &Arc<S> {
    &self.storage
  }

  /// Create the bucket if it does not exist.
  pub fn open(&self) -> Result<()> {
    self.storage.open_bucket(&self.name)
  }

  pub fn lookup(&self, key: &RequestKey) -> Result<Option<CachedEntry>> {
    self.storage.get(&self.name, key)
  }

  pub fn put(&self, key: &RequestKey, response: &HttpResponse) -> Result<()> {
    self.storage.put(&self.name, key, response)
  }

  pub fn put_all(&self, entries: &[(RequestKey, HttpResponse)]) -> Result<()> {
    self.storage.put_all(&self.name, entries)
  }

  pub fn keys(&self) -> Result<Vec<RequestKey>> {
    self.storage.keys(&self.name)
  }
}

impl<S: CacheStorage> Clone for CacheBucket<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      name: self.name.clone(),
    }
  }
}
