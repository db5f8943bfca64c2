//! HTTP request/response model and the network boundary.
//!
//! The worker never talks to reqwest directly; everything goes through the
//! [`Fetcher`] trait so tests can substitute a scripted fake.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use url::Url;

/// HTTP methods the worker understands. Only GET is ever cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  pub fn is_get(&self) -> bool {
    matches!(self, Method::Get)
  }
}

/// How the request was initiated (browser fetch semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
  /// Top-level page navigation
  Navigate,
  SameOrigin,
  Cors,
  #[default]
  NoCors,
}

/// What kind of resource the request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
  Document,
  Image,
  Script,
  Style,
  Font,
  #[default]
  Unknown,
}

/// An intercepted request, reduced to what the worker needs for routing.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub method: Method,
  pub url: Url,
  pub mode: RequestMode,
  pub destination: Destination,
  /// JSON body for non-GET requests (sync POSTs)
  pub body: Option<Vec<u8>>,
}

impl FetchRequest {
  /// A plain GET for a subresource.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      mode: RequestMode::NoCors,
      destination: Destination::Unknown,
      body: None,
    }
  }

  /// A top-level navigation request.
  pub fn navigate(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      mode: RequestMode::Navigate,
      destination: Destination::Document,
      body: None,
    }
  }

  /// A POST carrying a JSON payload.
  pub fn post_json(url: Url, payload: &serde_json::Value) -> Result<Self> {
    let body = serde_json::to_vec(payload).map_err(|e| eyre!("Failed to encode body: {}", e))?;
    Ok(Self {
      method: Method::Post,
      url,
      mode: RequestMode::SameOrigin,
      destination: Destination::Unknown,
      body: Some(body),
    })
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  /// Request identity used as the cache key: method + full URL.
  pub fn cache_key(&self) -> String {
    format!("{} {}", self.method.as_str(), self.url)
  }
}

/// A response as seen by the worker: status, headers, raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl FetchResponse {
  pub fn new(status: u16, body: Vec<u8>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body,
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// True for 2xx statuses. Only ok responses are ever written to cache.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Parse the body as JSON.
  pub fn json(&self) -> Result<serde_json::Value> {
    serde_json::from_slice(&self.body).map_err(|e| eyre!("Failed to parse response body: {}", e))
  }

  /// The synthetic response served when both network and valid cache are
  /// exhausted.
  pub fn offline() -> Self {
    let body = serde_json::json!({
      "error": "Offline",
      "message": "Data not available offline",
    });
    Self::new(503, body.to_string().into_bytes())
      .with_header("content-type", "application/json")
  }

  /// Placeholder image served when an image can be neither fetched nor found
  /// in cache.
  pub fn placeholder_image() -> Self {
    const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300" viewBox="0 0 400 300"><rect width="400" height="300" fill="#e5e7eb"/><text x="200" y="150" text-anchor="middle" fill="#9ca3af" font-family="sans-serif" font-size="16">Image unavailable</text></svg>"##;
    Self::new(200, PLACEHOLDER_SVG.as_bytes().to_vec())
      .with_header("content-type", "image/svg+xml")
  }
}

/// The network boundary. Implemented by [`HttpFetcher`] in production and by
/// scripted fakes in tests.
pub trait Fetcher: Send + Sync + 'static {
  fn fetch(&self, request: FetchRequest) -> impl Future<Output = Result<FetchResponse>> + Send;
}

/// reqwest-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, request: FetchRequest) -> impl Future<Output = Result<FetchResponse>> + Send {
    let client = self.client.clone();

    async move {
      let method = match request.method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
      };

      let mut builder = client.request(method, request.url.clone());
      if let Some(body) = request.body {
        builder = builder.header("content-type", "application/json").body(body);
      }

      let response = builder
        .send()
        .await
        .map_err(|e| eyre!("Network request to {} failed: {}", request.url, e))?;

      let status = response.status().as_u16();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect();
      let body = response
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read response body from {}: {}", request.url, e))?
        .to_vec();

      Ok(FetchResponse {
        status,
        headers,
        body,
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_cache_key_includes_method_and_url() {
    let req = FetchRequest::get(url("https://propertychain.example/api/properties"));
    assert_eq!(
      req.cache_key(),
      "GET https://propertychain.example/api/properties"
    );
  }

  #[test]
  fn test_navigate_sets_mode_and_destination() {
    let req = FetchRequest::navigate(url("https://propertychain.example/dashboard"));
    assert_eq!(req.mode, RequestMode::Navigate);
    assert_eq!(req.destination, Destination::Document);
  }

  #[test]
  fn test_offline_response_shape() {
    let resp = FetchResponse::offline();
    assert_eq!(resp.status, 503);
    assert!(!resp.ok());

    let body = resp.json().unwrap();
    assert_eq!(body["error"], "Offline");
    assert_eq!(body["message"], "Data not available offline");
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let resp = FetchResponse::new(200, Vec::new()).with_header("Content-Type", "text/html");
    assert_eq!(resp.header("content-type"), Some("text/html"));
  }

  #[test]
  fn test_placeholder_image_is_ok() {
    let resp = FetchResponse::placeholder_image();
    assert!(resp.ok());
    assert_eq!(resp.header("content-type"), Some("image/svg+xml"));
  }
}
