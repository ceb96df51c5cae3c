//! Middleware pipeline — composable request/response transformations
//!
//! Stages run in order before the request reaches its handler. Any stage may
//! short-circuit with a response. The response phase always runs every stage
//! in reverse order, on handler, short-circuit and error responses alike. A
//! stage whose request hook never ran can tell from the [`RequestContext`].
//!
//! Fixed order: rate limit → CORS → access log/metrics → LB context.

mod access_log;
mod cors;
mod lb_context;
mod rate_limit;

pub use access_log::AccessLogMiddleware;
pub use cors::CorsMiddleware;
pub use lb_context::LbContextMiddleware;
pub use rate_limit::{RateLimitMiddleware, RateLimiter};

use crate::config::RateLimitCategory;
use crate::error::Result;
use crate::observability::GatewayMetrics;
use async_trait::async_trait;
use http::{HeaderMap, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Instant;

/// Request context passed through the middleware pipeline
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Client identity used for rate limiting, see [`client_identity`]
    pub client_ip: String,
    /// HTTP method
    pub method: String,
    /// Inbound request path
    pub path: String,
    /// Set by the rate limiter once the request was counted
    pub category: Option<RateLimitCategory>,
    /// Set by the access log stage
    pub started_at: Option<Instant>,
    /// Set by the LB context stage
    pub request_id: Option<String>,
    /// Wall-clock start, set by the LB context stage
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl RequestContext {
    /// Build the context for one inbound request
    pub fn new(parts: &http::request::Parts, peer: SocketAddr, trust_forwarded_for: bool) -> Self {
        Self {
            client_ip: client_identity(&parts.headers, peer, trust_forwarded_for),
            method: parts.method.to_string(),
            path: parts.uri.path().to_string(),
            category: None,
            started_at: None,
            request_id: None,
            timestamp: None,
        }
    }
}

/// Peer IP of the connection. When the gateway sits behind a trusted proxy,
/// the first `X-Forwarded-For` entry is used instead if present.
pub fn client_identity(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if !trust_forwarded_for {
        return peer.ip().to_string();
    }
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

/// JSON response used by short-circuiting stages
pub fn json_response(status: StatusCode, body: &serde_json::Value) -> Response<Vec<u8>> {
    let mut resp = Response::new(serde_json::to_vec(body).unwrap_or_default());
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    resp
}

/// Middleware trait — process a request and optionally short-circuit
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request. Return Ok(None) to continue the pipeline,
    /// or Ok(Some(response)) to short-circuit with an immediate response.
    async fn handle_request(
        &self,
        req: &mut http::request::Parts,
        ctx: &mut RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>>;

    /// Process the response (optional, default is pass-through)
    async fn handle_response(
        &self,
        _resp: &mut http::response::Parts,
        _ctx: &RequestContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Middleware name for logging
    fn name(&self) -> &str;
}

/// Ordered middleware pipeline
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    /// Build the gateway pipeline in its fixed order
    pub fn standard(limiter: Arc<RateLimiter>, metrics: Arc<GatewayMetrics>) -> Self {
        Self::new(vec![
            Arc::new(RateLimitMiddleware::new(limiter)),
            Arc::new(CorsMiddleware::new()),
            Arc::new(AccessLogMiddleware::new(metrics)),
            Arc::new(LbContextMiddleware::new()),
        ])
    }

    /// Build a pipeline from explicit stages
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    /// Execute the request through all middlewares.
    /// Returns Some(response) if any middleware short-circuits.
    pub async fn process_request(
        &self,
        parts: &mut http::request::Parts,
        ctx: &mut RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        for mw in &self.middlewares {
            if let Some(response) = mw.handle_request(parts, ctx).await? {
                tracing::debug!(middleware = mw.name(), "Middleware short-circuited request");
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    /// Execute the response through all middlewares (reverse order)
    pub async fn process_response(
        &self,
        parts: &mut http::response::Parts,
        ctx: &RequestContext,
    ) -> Result<()> {
        for mw in self.middlewares.iter().rev() {
            mw.handle_response(parts, ctx).await?;
        }
        Ok(())
    }

    /// Stage names, in request order
    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|mw| mw.name()).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::lb_context::REQUEST_ID_HEADER;
    use super::*;
    use crate::store::MemoryStore;
    use std::collections::HashMap;

    pub(crate) fn make_parts(method: &str, uri: &str) -> http::request::Parts {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    pub(crate) fn make_ctx(parts: &http::request::Parts) -> RequestContext {
        RequestContext::new(parts, "10.1.2.3:5555".parse().unwrap(), false)
    }

    fn standard_pipeline(
        limit: u64,
    ) -> (Pipeline, Arc<GatewayMetrics>) {
        let mut overrides = HashMap::new();
        overrides.insert(
            "api_calls".to_string(),
            crate::config::RateLimitPolicy::new(limit, 60),
        );
        let limiter = Arc::new(RateLimiter::new(
            Arc::new(MemoryStore::new()),
            crate::config::resolve_policies(&overrides),
            crate::config::ClassifierConfig::default(),
            "lb",
        ));
        let metrics = Arc::new(GatewayMetrics::new());
        (Pipeline::standard(limiter, metrics.clone()), metrics)
    }

    async fn run(pipeline: &Pipeline, method: &str, uri: &str) -> http::response::Parts {
        let mut parts = make_parts(method, uri);
        let mut ctx = make_ctx(&parts);
        let resp = match pipeline.process_request(&mut parts, &mut ctx).await.unwrap() {
            Some(resp) => resp,
            None => Response::new(Vec::new()),
        };
        let (mut resp_parts, _) = resp.into_parts();
        pipeline.process_response(&mut resp_parts, &ctx).await.unwrap();
        resp_parts
    }

    #[test]
    fn test_standard_order() {
        let (pipeline, _) = standard_pipeline(10);
        assert_eq!(
            pipeline.names(),
            vec!["rate-limit", "cors", "access-log", "lb-context"]
        );
    }

    #[tokio::test]
    async fn test_empty_pipeline_passthrough() {
        let pipeline = Pipeline::new(Vec::new());
        let mut parts = make_parts("GET", "/test");
        let mut ctx = make_ctx(&parts);
        let result = pipeline.process_request(&mut parts, &mut ctx).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_allowed_request_passes_every_stage() {
        let (pipeline, metrics) = standard_pipeline(10);
        let resp = run(&pipeline, "GET", "/api/users").await;
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.headers["access-control-allow-origin"], "*");
        assert!(resp.headers.contains_key(REQUEST_ID_HEADER));
        assert_eq!(metrics.total_requests(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_response_gets_cors_but_no_metrics() {
        let (pipeline, metrics) = standard_pipeline(1);
        run(&pipeline, "GET", "/api/users").await;
        let resp = run(&pipeline, "GET", "/api/users").await;

        assert_eq!(resp.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(resp.headers["access-control-allow-origin"], "*");
        assert!(!resp.headers.contains_key(REQUEST_ID_HEADER));
        assert_eq!(metrics.total_requests(), 1);
    }

    #[tokio::test]
    async fn test_preflight_short_circuits_after_rate_limit() {
        let (pipeline, metrics) = standard_pipeline(10);
        let resp = run(&pipeline, "OPTIONS", "/api/users").await;
        assert_eq!(resp.status, StatusCode::NO_CONTENT);
        assert_eq!(resp.headers["access-control-allow-origin"], "*");
        assert_eq!(metrics.total_requests(), 0);
    }

    #[test]
    fn test_client_identity_ignores_forwarded_for_by_default() {
        let peer: SocketAddr = "10.0.0.9:1234".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_identity(&headers, peer, false), "10.0.0.9");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_identity(&headers, peer, false), "10.0.0.9");
    }

    #[test]
    fn test_client_identity_trusted_forwarded_for() {
        let peer: SocketAddr = "10.0.0.9:1234".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_identity(&headers, peer, true), "10.0.0.9");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_identity(&headers, peer, true), "203.0.113.7");

        headers.insert("x-forwarded-for", " ".parse().unwrap());
        assert_eq!(client_identity(&headers, peer, true), "10.0.0.9");
    }

    #[test]
    fn test_context_new() {
        let parts = make_parts("POST", "/api/trading/orders?x=1");
        let ctx = make_ctx(&parts);
        assert_eq!(ctx.method, "POST");
        assert_eq!(ctx.path, "/api/trading/orders");
        assert_eq!(ctx.client_ip, "10.1.2.3");
        assert!(ctx.category.is_none());
        assert!(ctx.started_at.is_none());
        assert!(ctx.request_id.is_none());
    }

    #[test]
    fn test_json_response() {
        let resp = json_response(StatusCode::BAD_REQUEST, &serde_json::json!({"error": "x"}));
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers()["content-type"], "application/json");
        assert_eq!(resp.body(), br#"{"error":"x"}"#);
    }
}
