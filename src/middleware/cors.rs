//! CORS middleware — permissive Cross-Origin Resource Sharing
//!
//! Every response carries the allow headers; preflight `OPTIONS` requests are
//! answered directly with `204 No Content`.

use super::{Middleware, RequestContext};
use crate::error::Result;
use async_trait::async_trait;
use http::{HeaderValue, Response, StatusCode};

const ALLOW_ORIGIN: &str = "*";
const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Request-ID";
const MAX_AGE: &str = "86400";

/// CORS middleware
pub struct CorsMiddleware;

impl CorsMiddleware {
    pub fn new() -> Self {
        Self
    }

    fn apply(headers: &mut http::HeaderMap) {
        headers.insert(
            "access-control-allow-origin",
            HeaderValue::from_static(ALLOW_ORIGIN),
        );
        headers.insert(
            "access-control-allow-methods",
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            "access-control-allow-headers",
            HeaderValue::from_static(ALLOW_HEADERS),
        );
    }
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for CorsMiddleware {
    async fn handle_request(
        &self,
        req: &mut http::request::Parts,
        _ctx: &mut RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        if req.method != http::Method::OPTIONS {
            return Ok(None);
        }

        let mut response = Response::new(Vec::new());
        *response.status_mut() = StatusCode::NO_CONTENT;
        response
            .headers_mut()
            .insert("access-control-max-age", HeaderValue::from_static(MAX_AGE));
        Ok(Some(response))
    }

    async fn handle_response(
        &self,
        resp: &mut http::response::Parts,
        _ctx: &RequestContext,
    ) -> Result<()> {
        Self::apply(&mut resp.headers);
        Ok(())
    }

    fn name(&self) -> &str {
        "cors"
    }
}
