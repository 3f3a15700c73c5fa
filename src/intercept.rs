//! Cache-first request interception.

use color_eyre::Result;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheBucket, CacheStorage, RequestKey, ResponseSource};
use crate::net::{HttpRequest, HttpResponse, SharedFetcher};

/// A detached write of a fetched response into the cache.
///
/// Dropping it leaves the write running. Failures are logged and never reach
/// the caller of the intercepted request.
#[derive(Debug)]
pub struct CacheWrite(JoinHandle<()>);

impl CacheWrite {
  /// Wait until the write has finished, successfully or not.
  pub async fn finished(self) {
    if let Err(e) = self.0.await {
      warn!(error = %e, "Cache write task did not complete");
    }
  }
}

/// Result of intercepting one request.
#[derive(Debug)]
pub struct Intercepted {
  pub response: HttpResponse,
  pub source: ResponseSource,
  /// Present when a copy of a network response is being stored
  pub cache_write: Option<CacheWrite>,
}

/// Serves requests from the current bucket and falls back to the network.
pub struct RequestInterceptor<S: CacheStorage> {
  bucket: CacheBucket<S>,
  fetcher: SharedFetcher,
}

impl<S: CacheStorage> RequestInterceptor<S> {
  pub fn new(bucket: CacheBucket<S>, fetcher: SharedFetcher) -> Self {
    Self { bucket, fetcher }
  }

  /// Handle one request.
  ///
  /// Only GET requests go through the cache. Every other method is passed
  /// straight to the network and its response is never stored.
  ///
  /// 1. Exact match in the bucket: returned as is, the network is not touched
  /// 2. Miss: fetch; a transport error goes straight back to the caller
  /// 3. Anything but a 200 same-origin response is returned uncached
  /// 4. Otherwise a copy is stored in the background and the original returned
  pub async fn handle(&self, request: &HttpRequest) -> Result<Intercepted> {
    let key = RequestKey::from(request);

    if key.method != "GET" {
      debug!(method = %key.method, url = %key.url, "Bypassing cache");
      return Ok(Intercepted {
        response: self.fetcher.fetch(request).await?,
        source: ResponseSource::Network,
        cache_write: None,
      });
    }

    if let Some(entry) = self.bucket.lookup(&key)? {
      debug!(url = %key.url, cached_at = %entry.cached_at, "Cache hit");
      return Ok(Intercepted {
        response: entry.response,
        source: ResponseSource::Cache,
        cache_write: None,
      });
    }

    debug!(url = %key.url, "Cache miss, fetching");
    let response = self.fetcher.fetch(request).await?;

    if !response.is_cacheable() {
      debug!(
        url = %key.url,
        status = response.status,
        kind = response.kind.as_str(),
        "Not caching response"
      );
      return Ok(Intercepted {
        response,
        source: ResponseSource::Network,
        cache_write: None,
      });
    }

    let duplicate = response.clone();
    let bucket = self.bucket.clone();
    let write = tokio::task::spawn_blocking(move || {
      if let Err(e) = bucket.put(&key, &duplicate) {
        warn!(url = %key.url, error = %e, "Failed to store response in cache");
      }
    });

    Ok(Intercepted {
      response,
      source: ResponseSource::Network,
      cache_write: Some(CacheWrite(write)),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::cache::CachedEntry;
  use crate::net::testing::MockFetcher;
  use crate::net::ResponseKind;
  use std::sync::Arc;
  use url::Url;

  const ORIGIN: &str = "https://fuel.example.com";

  fn setup() -> (
    RequestInterceptor<SqliteStorage>,
    CacheBucket<SqliteStorage>,
    Arc<MockFetcher>,
  ) {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    let bucket = CacheBucket::new(storage, "fuel-tracker-v1.0.0");
    let fetcher = Arc::new(MockFetcher::new());
    let interceptor = RequestInterceptor::new(bucket.clone(), fetcher.clone());
    (interceptor, bucket, fetcher)
  }

  fn get(path: &str) -> HttpRequest {
    HttpRequest::resolve(&Url::parse(ORIGIN).unwrap(), "GET", path).unwrap()
  }

  #[tokio::test]
  async fn test_hit_skips_network() {
    let (interceptor, bucket, fetcher) = setup();
    let request = get("/static/css/style.css");
    let cached = HttpResponse {
      url: request.url.to_string(),
      status: 200,
      headers: Vec::new(),
      body: b"body{}".to_vec(),
      kind: ResponseKind::Basic,
    };
    bucket.put(&RequestKey::from(&request), &cached).unwrap();

    let result = interceptor.handle(&request).await.unwrap();
    assert_eq!(result.source, ResponseSource::Cache);
    assert_eq!(result.response, cached);
    assert!(result.cache_write.is_none());
    assert_eq!(fetcher.calls(), 0);
  }

  #[tokio::test]
  async fn test_miss_returns_and_stores_copy() {
    let (interceptor, bucket, fetcher) = setup();
    let request = get("/fuel/records");
    fetcher.ok(request.url.as_str(), "records page");

    let result = interceptor.handle(&request).await.unwrap();
    assert_eq!(result.source, ResponseSource::Network);
    assert_eq!(result.response.body, b"records page");

    result.cache_write.expect("write scheduled").finished().await;
    let entry = bucket.lookup(&RequestKey::from(&request)).unwrap().unwrap();
    assert_eq!(entry.response.body, b"records page");

    // Second request is served from cache
    let again = interceptor.handle(&request).await.unwrap();
    assert_eq!(again.source, ResponseSource::Cache);
    assert_eq!(fetcher.calls(), 1);
  }

  #[tokio::test]
  async fn test_non_200_is_not_cached() {
    let (interceptor, bucket, fetcher) = setup();
    let request = get("/missing");
    fetcher.respond(request.url.as_str(), 404, ResponseKind::Basic, "nope");

    let result = interceptor.handle(&request).await.unwrap();
    assert_eq!(result.response.status, 404);
    assert!(result.cache_write.is_none());
    assert!(bucket.keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_cross_origin_is_not_cached() {
    let (interceptor, bucket, fetcher) = setup();
    let request = get("https://cdn.example.com/chart.js");
    fetcher.respond(request.url.as_str(), 200, ResponseKind::Cors, "chart");

    let result = interceptor.handle(&request).await.unwrap();
    assert_eq!(result.response.body, b"chart");
    assert!(result.cache_write.is_none());
    assert!(bucket.keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_network_failure_without_cache_is_error() {
    let (interceptor, bucket, fetcher) = setup();
    let request = get("/offline-page");
    fetcher.fail(request.url.as_str(), "network unreachable");

    let err = interceptor.handle(&request).await.unwrap_err();
    assert!(err.to_string().contains("network unreachable"));
    assert!(bucket.keys().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_head_is_not_served_from_get_entry() {
    let (interceptor, bucket, fetcher) = setup();
    let get_request = get("/api/summary");
    fetcher.ok(get_request.url.as_str(), "summary");
    bucket
      .put(
        &RequestKey::from(&get_request),
        &HttpResponse {
          url: get_request.url.to_string(),
          status: 200,
          headers: Vec::new(),
          body: b"cached summary".to_vec(),
          kind: ResponseKind::Basic,
        },
      )
      .unwrap();

    let head = HttpRequest {
      method: "HEAD".to_string(),
      ..get_request
    };
    let result = interceptor.handle(&head).await.unwrap();
    assert_eq!(result.source, ResponseSource::Network);
    assert!(result.cache_write.is_none());
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(bucket.keys().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_repeated_post_always_reaches_network() {
    let (interceptor, bucket, fetcher) = setup();
    let url = Url::parse(ORIGIN).unwrap().join("/add_record").unwrap();
    fetcher.ok(url.as_str(), "saved");

    let post = |body: &str| HttpRequest {
      method: "POST".to_string(),
      url: url.clone(),
      headers: vec![(
        "Content-Type".to_string(),
        "application/x-www-form-urlencoded".to_string(),
      )],
      body: Some(body.as_bytes().to_vec()),
    };

    let first = interceptor.handle(&post("liters=30")).await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    assert!(first.cache_write.is_none());

    let second = interceptor.handle(&post("liters=45")).await.unwrap();
    assert_eq!(second.source, ResponseSource::Network);
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(
      fetcher.requests()[1].body.as_deref(),
      Some(&b"liters=45"[..])
    );
    assert!(bucket.keys().unwrap().is_empty());
  }

  /// Storage that accepts everything except single-entry writes.
  struct RejectingStorage(SqliteStorage);

  impl CacheStorage for RejectingStorage {
    fn open_bucket(&self, bucket: &str) -> Result<()> {
      self.0.open_bucket(bucket)
    }

    fn bucket_names(&self) -> Result<Vec<String>> {
      self.0.bucket_names()
    }

    fn delete_bucket(&self, bucket: &str) -> Result<bool> {
      self.0.delete_bucket(bucket)
    }

    fn get(&self, bucket: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
      self.0.get(bucket, key)
    }

    fn put(&self, _bucket: &str, _key: &RequestKey, _response: &HttpResponse) -> Result<()> {
      Err(color_eyre::eyre::eyre!("disk full"))
    }

    fn put_all(&self, bucket: &str, entries: &[(RequestKey, HttpResponse)]) -> Result<()> {
      self.0.put_all(bucket, entries)
    }

    fn keys(&self, bucket: &str) -> Result<Vec<RequestKey>> {
      self.0.keys(bucket)
    }
  }

  #[tokio::test]
  async fn test_failed_cache_write_still_returns_response() {
    let storage = Arc::new(RejectingStorage(SqliteStorage::open_in_memory().unwrap()));
    let bucket = CacheBucket::new(storage, "fuel-tracker-v1.0.0");
    let fetcher = Arc::new(MockFetcher::new());
    let interceptor = RequestInterceptor::new(bucket.clone(), fetcher.clone());

    let request = get("/fuel/records");
    fetcher.ok(request.url.as_str(), "records page");

    let result = interceptor.handle(&request).await.unwrap();
    assert_eq!(result.source, ResponseSource::Network);
    assert_eq!(result.response.body, b"records page");

    result.cache_write.expect("write scheduled").finished().await;
    assert!(bucket.keys().unwrap().is_empty());

    // Nothing was stored, so the next request goes back to the network
    let again = interceptor.handle(&request).await.unwrap();
    assert_eq!(again.source, ResponseSource::Network);
    assert_eq!(fetcher.calls(), 2);
  }
}
