//! Pure request classification.
//!
//! Runs synchronously before any async work so the routing decision can
//! never race with cache traffic.

use crate::fetch::{Destination, FetchRequest, RequestMode};

/// Which caching strategy a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
  /// Non-GET traffic: forwarded untouched, never cached.
  Passthrough,
  /// API calls: network-first with a TTL-bounded cache fallback.
  Api,
  /// Images: cache-first with background revalidation.
  Image,
  /// Top-level navigations: network-first with offline page fallback.
  Navigation,
  /// Everything else: stale-while-revalidate.
  Asset,
}

/// Extensions treated as images when the destination is unknown.
const IMAGE_EXTENSIONS: &[&str] = &[
  ".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg", ".ico", ".avif",
];

/// Classify a request by method, URL shape, destination and mode.
pub fn classify(request: &FetchRequest, api_prefix: &str) -> RouteClass {
  if !request.method.is_get() {
    return RouteClass::Passthrough;
  }

  if request.url.path().starts_with(api_prefix) {
    return RouteClass::Api;
  }

  if is_image(request) {
    return RouteClass::Image;
  }

  if request.mode == RequestMode::Navigate {
    return RouteClass::Navigation;
  }

  RouteClass::Asset
}

fn is_image(request: &FetchRequest) -> bool {
  if request.destination == Destination::Image {
    return true;
  }

  let path = request.url.path().to_ascii_lowercase();
  IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fetch::Method;
  use url::Url;

  fn get(path: &str) -> FetchRequest {
    FetchRequest::get(Url::parse(&format!("https://propertychain.example{}", path)).unwrap())
  }

  #[test]
  fn test_non_get_passes_through() {
    let mut req = get("/api/properties");
    req.method = Method::Post;
    assert_eq!(classify(&req, "/api/"), RouteClass::Passthrough);

    req.method = Method::Delete;
    assert_eq!(classify(&req, "/api/"), RouteClass::Passthrough);
  }

  #[test]
  fn test_api_prefix_routes_to_api() {
    assert_eq!(classify(&get("/api/properties"), "/api/"), RouteClass::Api);
    assert_eq!(classify(&get("/api/pools/7"), "/api/"), RouteClass::Api);
  }

  #[test]
  fn test_image_by_destination() {
    let req = get("/cdn/hero").with_destination(Destination::Image);
    assert_eq!(classify(&req, "/api/"), RouteClass::Image);
  }

  #[test]
  fn test_image_by_extension() {
    for path in ["/img/logo.png", "/img/photo.JPEG", "/favicon.ico", "/art.webp"] {
      assert_eq!(classify(&get(path), "/api/"), RouteClass::Image, "{}", path);
    }
  }

  #[test]
  fn test_api_prefix_wins_over_image_extension() {
    // API responses are never image-cached, even with an image-ish path
    assert_eq!(
      classify(&get("/api/avatar.png"), "/api/"),
      RouteClass::Api
    );
  }

  #[test]
  fn test_navigation_mode() {
    let req =
      FetchRequest::navigate(Url::parse("https://propertychain.example/dashboard").unwrap());
    assert_eq!(classify(&req, "/api/"), RouteClass::Navigation);
  }

  #[test]
  fn test_everything_else_is_asset() {
    assert_eq!(classify(&get("/app.js"), "/api/"), RouteClass::Asset);
    assert_eq!(classify(&get("/styles.css"), "/api/"), RouteClass::Asset);
    assert_eq!(classify(&get("/fonts/inter.woff2"), "/api/"), RouteClass::Asset);
  }
}
