//! Install-time population and activate-time cleanup of cache buckets.

use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, try_join_all};
use tracing::info;
use url::Url;

use super::bucket::CacheBucket;
use super::storage::CacheStorage;
use super::traits::RequestKey;
use crate::net::{HttpRequest, HttpResponse, SharedFetcher};

/// Owns the current bucket's lifecycle.
pub struct CacheManager<S: CacheStorage> {
  bucket: CacheBucket<S>,
  fetcher: SharedFetcher,
  origin: Url,
  precache: Vec<String>,
}

impl<S: CacheStorage> CacheManager<S> {
  pub fn new(
    bucket: CacheBucket<S>,
    fetcher: SharedFetcher,
    origin: Url,
    precache: Vec<String>,
  ) -> Self {
    Self {
      bucket,
      fetcher,
      origin,
      precache,
    }
  }

  pub fn bucket(&self) -> &CacheBucket<S> {
    &self.bucket
  }

  /// Open the current bucket and fill it with the precache list.
  ///
  /// Every resource is fetched before anything is written. One transport error
  /// or non-2xx status fails the install and leaves the bucket untouched.
  /// Returns the number of stored resources.
  pub async fn install(&self) -> Result<usize> {
    self.bucket.open()?;
    info!(cache = self.bucket.name(), "Opened cache");

    let requests = self
      .precache
      .iter()
      .map(|path| HttpRequest::resolve(&self.origin, "GET", path))
      .collect::<Result<Vec<_>>>()?;

    let entries = try_join_all(requests.iter().map(|request| self.precache_one(request))).await?;

    self.bucket.put_all(&entries)?;
    info!(cache = self.bucket.name(), count = entries.len(), "Precached resources");

    Ok(entries.len())
  }

  async fn precache_one(&self, request: &HttpRequest) -> Result<(RequestKey, HttpResponse)> {
    let response = self.fetcher.fetch(request).await?;
    if !response.is_ok() {
      return Err(eyre!(
        "Precache request for {} returned status {}",
        request.url,
        response.status
      ));
    }

    Ok((RequestKey::from(request), response))
  }

  /// Delete every bucket whose name differs from the current one.
  ///
  /// Deletions run concurrently and all of them finish before this returns.
  /// Returns the names of the deleted buckets.
  pub async fn activate(&self) -> Result<Vec<String>> {
    let stale: Vec<String> = self
      .bucket
      .storage()
      .bucket_names()?
      .into_iter()
      .filter(|name| name != self.bucket.name())
      .collect();

    let deletions = stale.into_iter().map(|name| {
      let storage = self.bucket.storage().clone();
      tokio::task::spawn_blocking(move || {
        info!(cache = %name, "Deleting old cache");
        storage.delete_bucket(&name).map(|_| name)
      })
    });

    let mut deleted = Vec::new();
    let mut first_error = None;
    for joined in join_all(deletions).await {
      match joined {
        Ok(Ok(name)) => deleted.push(name),
        Ok(Err(e)) => {
          first_error.get_or_insert(e);
        }
        Err(e) => {
          first_error.get_or_insert(eyre!("Cache deletion task failed: {}", e));
        }
      }
    }

    match first_error {
      Some(e) => Err(e),
      None => Ok(deleted),
    }
  }
}
