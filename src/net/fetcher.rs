//! Network access behind a trait so the cache logic can run against a fake.

use color_eyre::{eyre::eyre, Result};
use reqwest::{Client, Method};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::types::{HttpRequest, HttpResponse, ResponseKind};

/// A boxed future returned by a fetcher
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + 'a>>;

/// Performs network requests on behalf of the agent.
pub trait Fetcher: Send + Sync {
  /// Send a request and buffer the whole response.
  ///
  /// Only transport failures are errors; any HTTP status is a response.
  fn fetch<'a>(&'a self, request: &'a HttpRequest) -> FetchFuture<'a>;
}

/// Fetcher shared between handlers
pub type SharedFetcher = Arc<dyn Fetcher>;

/// reqwest-backed fetcher that classifies responses against the agent's origin.
#[derive(Clone)]
pub struct HttpFetcher {
  client: Client,
  origin: Url,
}

impl HttpFetcher {
  pub fn new(origin: Url, timeout: Duration) -> Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
    let method = Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method '{}': {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let final_url = response.url().clone();
    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(k, v)| {
        v.to_str()
          .ok()
          .map(|v| (k.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", final_url, e))?
      .to_vec();

    Ok(HttpResponse {
      url: final_url.to_string(),
      status,
      headers,
      body,
      kind: ResponseKind::classify(&self.origin, &final_url),
    })
  }
}

impl Fetcher for HttpFetcher {
  fn fetch<'a>(&'a self, request: &'a HttpRequest) -> FetchFuture<'a> {
    Box::pin(self.send(request))
  }
}
