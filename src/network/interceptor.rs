//! Cache Interceptor Module
//!
//! Response caching for GET requests in an HTTP client or server pipeline.

use std::sync::Arc;

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{Request, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use crate::cache::{CacheStats, VeloxCache};
use crate::config::{CacheConfig, InterceptorConfig};
use crate::error::Result;

/// Header added to responses served from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-velox-cache";

/// Computes the cache key for a request.
pub type KeyStrategy = Arc<dyn Fn(&Method, &Uri) -> String + Send + Sync>;

// == Cached Response ==
/// Buffered copy of a response.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    /// Rebuilds a response marked as a cache hit.
    pub fn into_hit_response(self) -> Response {
        let mut response = (self.status, self.headers, self.body).into_response();
        response
            .headers_mut()
            .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
        response
    }
}

/// Default key: method, path and the query pairs in sorted order.
pub fn default_cache_key(method: &Method, uri: &Uri) -> String {
    let mut pairs: Vec<&str> = uri
        .query()
        .map(|q| q.split('&').filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    pairs.sort_unstable();

    if pairs.is_empty() {
        format!("{} {}", method, uri.path())
    } else {
        format!("{} {}?{}", method, uri.path(), pairs.join("&"))
    }
}

// == Cache Interceptor ==
/// Caches successful GET responses and short-circuits repeat requests.
///
/// Capacity is bounded by `max_entries`; when full the least recently
/// used response is evicted.
#[derive(Clone)]
pub struct CacheInterceptor {
    cache: VeloxCache<CachedResponse>,
    key_strategy: KeyStrategy,
    max_body_bytes: usize,
}

impl std::fmt::Debug for CacheInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInterceptor")
            .field("cache", &self.cache)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish_non_exhaustive()
    }
}

impl CacheInterceptor {
    pub fn new(config: &InterceptorConfig) -> Result<Self> {
        config.validate()?;
        let cache = VeloxCache::from_config(&CacheConfig {
            max_size: config.max_entries,
            default_ttl: config.ttl,
            ..CacheConfig::default()
        })?;
        Ok(Self {
            cache,
            key_strategy: Arc::new(default_cache_key),
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Replaces the key strategy.
    pub fn with_key_strategy<F>(mut self, strategy: F) -> Self
    where
        F: Fn(&Method, &Uri) -> String + Send + Sync + 'static,
    {
        self.key_strategy = Arc::new(strategy);
        self
    }

    pub fn cache_key(&self, method: &Method, uri: &Uri) -> String {
        (self.key_strategy)(method, uri)
    }

    // == Request Stage ==
    /// Attaches a fresh cached response to the request's extensions.
    ///
    /// Returns true when the request can be answered without going
    /// downstream. Non-GET requests are never touched.
    pub fn on_request<B>(&self, request: &mut axum::http::Request<B>) -> bool {
        if request.method() != Method::GET {
            return false;
        }
        let key = self.cache_key(request.method(), request.uri());
        match self.cache.get(&key) {
            Some(cached) => {
                request.extensions_mut().insert(cached);
                true
            }
            None => false,
        }
    }

    // == Response Stage ==
    /// Stores `response` if it answers a GET with a 2xx status.
    pub fn on_response(&self, method: &Method, uri: &Uri, response: &CachedResponse) -> bool {
        if method != Method::GET || !response.status.is_success() {
            return false;
        }
        let key = self.cache_key(method, uri);
        self.cache.put(&key, response.clone());
        debug!(key = %key, "Cached response");
        true
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drops the response stored under `key`.
    pub fn evict(&self, key: &str) -> bool {
        self.cache.remove(key).is_some()
    }

    pub fn evict_expired(&self) -> usize {
        self.cache.remove_expired()
    }

    pub fn len(&self) -> usize {
        self.cache.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Returns true when the body is known to fit within `limit` bytes.
///
/// Streamed bodies without an upper size bound never qualify, so they pass
/// through unbuffered.
fn fits_body_limit(response: &Response, limit: usize) -> bool {
    let declared_ok = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(true, |len| len <= limit as u64);
    let bounded = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= limit as u64);
    declared_ok && bounded
}

// == Middleware ==
/// Axum middleware applying a [`CacheInterceptor`].
///
/// Install with `axum::middleware::from_fn_with_state(interceptor, cache_middleware)`.
pub async fn cache_middleware(
    State(interceptor): State<CacheInterceptor>,
    mut request: Request,
    next: Next,
) -> Response {
    if interceptor.on_request(&mut request) {
        if let Some(cached) = request.extensions_mut().remove::<CachedResponse>() {
            debug!(uri = %request.uri(), "Serving response from cache");
            return cached.into_hit_response();
        }
    }

    let method = request.method().clone();
    let uri = request.uri().clone();
    let response = next.run(request).await;

    if method != Method::GET
        || !response.status().is_success()
        || !fits_body_limit(&response, interceptor.max_body_bytes)
    {
        return response;
    }

    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, interceptor.max_body_bytes).await {
        Ok(bytes) => {
            let cached = CachedResponse {
                status: parts.status,
                headers: parts.headers.clone(),
                body: bytes.clone(),
            };
            interceptor.on_response(&method, &uri, &cached);
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(err) => {
            // Only reachable when the upstream body itself fails mid-read
            warn!(uri = %uri, error = %err, "Failed to buffer response body for caching");
            (StatusCode::BAD_GATEWAY, "upstream response body failed").into_response()
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn interceptor(max_entries: usize) -> CacheInterceptor {
        CacheInterceptor::new(&InterceptorConfig {
            max_entries,
            ttl: Duration::from_secs(60),
            max_body_bytes: 1024,
        })
        .unwrap()
    }

    fn ok(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn test_default_key_sorts_query() {
        let a: Uri = "/users?b=2&a=1".parse().unwrap();
        let b: Uri = "/users?a=1&b=2".parse().unwrap();
        assert_eq!(default_cache_key(&Method::GET, &a), "GET /users?a=1&b=2");
        assert_eq!(default_cache_key(&Method::GET, &a), default_cache_key(&Method::GET, &b));

        let plain: Uri = "/users".parse().unwrap();
        assert_eq!(default_cache_key(&Method::GET, &plain), "GET /users");
    }

    #[test]
    fn test_request_short_circuits_after_cached_response() {
        let interceptor = interceptor(10);
        let uri: Uri = "/items?page=1".parse().unwrap();

        let mut first = axum::http::Request::get(uri.clone()).body(()).unwrap();
        assert!(!interceptor.on_request(&mut first));

        assert!(interceptor.on_response(&Method::GET, &uri, &ok("[1,2]")));

        let mut second = axum::http::Request::get(uri).body(()).unwrap();
        assert!(interceptor.on_request(&mut second));
        let cached = second.extensions().get::<CachedResponse>().unwrap();
        assert_eq!(cached.body, Bytes::from_static(b"[1,2]"));
    }

    #[test]
    fn test_non_get_and_errors_are_not_cached() {
        let interceptor = interceptor(10);
        let uri: Uri = "/items".parse().unwrap();

        assert!(!interceptor.on_response(&Method::POST, &uri, &ok("x")));
        let failed = CachedResponse {
            status: StatusCode::SERVICE_UNAVAILABLE,
            ..ok("down")
        };
        assert!(!interceptor.on_response(&Method::GET, &uri, &failed));
        assert!(interceptor.is_empty());

        let mut post = axum::http::Request::post(uri).body(()).unwrap();
        assert!(!interceptor.on_request(&mut post));
    }

    #[test]
    fn test_capacity_evicts_least_recent() {
        let interceptor = interceptor(2);
        let a: Uri = "/a".parse().unwrap();
        let b: Uri = "/b".parse().unwrap();
        let c: Uri = "/c".parse().unwrap();

        interceptor.on_response(&Method::GET, &a, &ok("a"));
        interceptor.on_response(&Method::GET, &b, &ok("b"));
        let mut touch_a = axum::http::Request::get(a.clone()).body(()).unwrap();
        interceptor.on_request(&mut touch_a);
        interceptor.on_response(&Method::GET, &c, &ok("c"));

        assert_eq!(interceptor.len(), 2);
        assert!(!interceptor.evict("GET /b"));
        assert!(interceptor.evict("GET /a"));
    }

    #[test]
    fn test_custom_key_strategy_and_clear() {
        let interceptor = interceptor(10).with_key_strategy(|_, uri| uri.path().to_string());
        let uri: Uri = "/x?ignored=1".parse().unwrap();

        assert_eq!(interceptor.cache_key(&Method::GET, &uri), "/x");
        interceptor.on_response(&Method::GET, &uri, &ok("x"));
        assert!(interceptor.evict("/x"));

        interceptor.on_response(&Method::GET, &uri, &ok("x"));
        interceptor.clear_cache();
        assert!(interceptor.is_empty());
        assert_eq!(interceptor.evict_expired(), 0);
    }
}
