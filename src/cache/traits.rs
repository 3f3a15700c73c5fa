//! Core types for the response cache.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::net::{HttpRequest, HttpResponse};

/// Identity of a cached request: method plus absolute URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &url::Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);

    Self {
      method: method.to_ascii_uppercase(),
      url: url.to_string(),
    }
  }

  /// Stable fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl From<&HttpRequest> for RequestKey {
  fn from(request: &HttpRequest) -> Self {
    Self::new(&request.method, &request.url)
  }
}

/// A stored response and when it was written.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub response: HttpResponse,
  pub cached_at: DateTime<Utc>,
}

/// Where a response handed to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Served from the current cache bucket
  Cache,
  /// Fetched from the network
  Network,
}
