//! Request and response values passed between the fetcher, the cache and callers.

use color_eyre::{eyre::eyre, Result};
use url::Url;

/// An outgoing request as seen by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
}

impl HttpRequest {
  /// Build a POST request carrying a JSON body.
  pub fn post_json(url: Url, body: Vec<u8>) -> Self {
    Self {
      method: "POST".to_string(),
      url,
      headers: vec![("Content-Type".to_string(), "application/json".to_string())],
      body: Some(body),
    }
  }

  /// Resolve `target` against `origin` and build a request with the given method.
  ///
  /// Absolute URLs are kept as they are, so cross-origin requests pass through.
  pub fn resolve(origin: &Url, method: &str, target: &str) -> Result<Self> {
    let url = origin
      .join(target)
      .map_err(|e| eyre!("Invalid request URL '{}': {}", target, e))?;

    Ok(Self {
      method: method.to_ascii_uppercase(),
      url,
      headers: Vec::new(),
      body: None,
    })
  }
}

/// How a response relates to the agent's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
  /// Same-origin response with a readable status and body
  Basic,
  /// Cross-origin response
  Cors,
}

impl ResponseKind {
  /// Classify a response URL against the agent's origin.
  pub fn classify(origin: &Url, response_url: &Url) -> Self {
    if origin.origin() == response_url.origin() {
      ResponseKind::Basic
    } else {
      ResponseKind::Cors
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseKind::Basic => "basic",
      ResponseKind::Cors => "cors",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "basic" => Ok(ResponseKind::Basic),
      "cors" => Ok(ResponseKind::Cors),
      other => Err(eyre!("Unknown response kind '{}'", other)),
    }
  }
}

/// A fully buffered response.
///
/// Bodies are held in memory, so duplicating a response for the cache is a clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  /// Final URL after redirects
  pub url: String,
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl HttpResponse {
  /// Whether the status is in the 2xx range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Only plain successful same-origin responses are stored on the fetch path.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind == ResponseKind::Basic
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn origin() -> Url {
    Url::parse("https://fuel.example.com").unwrap()
  }

  #[test]
  fn test_classify_same_origin() {
    let url = Url::parse("https://fuel.example.com/static/js/app.js").unwrap();
    assert_eq!(ResponseKind::classify(&origin(), &url), ResponseKind::Basic);
  }

  #[test]
  fn test_classify_cross_origin() {
    let other_host = Url::parse("https://cdn.example.com/lib.js").unwrap();
    let other_scheme = Url::parse("http://fuel.example.com/").unwrap();
    let other_port = Url::parse("https://fuel.example.com:8443/").unwrap();

    assert_eq!(ResponseKind::classify(&origin(), &other_host), ResponseKind::Cors);
    assert_eq!(ResponseKind::classify(&origin(), &other_scheme), ResponseKind::Cors);
    assert_eq!(ResponseKind::classify(&origin(), &other_port), ResponseKind::Cors);
  }

  #[test]
  fn test_resolve_relative_and_absolute() {
    let req = HttpRequest::resolve(&origin(), "get", "/manifest.json").unwrap();
    assert_eq!(req.method, "GET");
    assert_eq!(req.url.as_str(), "https://fuel.example.com/manifest.json");

    let req = HttpRequest::resolve(&origin(), "GET", "https://cdn.example.com/x.css").unwrap();
    assert_eq!(req.url.as_str(), "https://cdn.example.com/x.css");
  }

  #[test]
  fn test_cacheable_requires_200_and_basic() {
    let ok = HttpResponse {
      url: "https://fuel.example.com/".to_string(),
      status: 200,
      headers: vec![("Content-Type".to_string(), "text/html".to_string())],
      body: b"<html></html>".to_vec(),
      kind: ResponseKind::Basic,
    };
    assert!(ok.is_cacheable());

    let created = HttpResponse {
      status: 201,
      ..ok.clone()
    };
    assert!(created.is_ok());
    assert!(!created.is_cacheable());

    let cors = HttpResponse {
      kind: ResponseKind::Cors,
      ..ok
    };
    assert!(!cors.is_cacheable());
  }
}
