//! Load-balancing context — request id and start timestamp
//!
//! The id goes to the backend as `X-Request-ID` and comes back on the response.
//! An id already supplied by the client is kept.

use super::{Middleware, RequestContext};
use crate::error::Result;
use async_trait::async_trait;
use http::{HeaderValue, Response};

/// Header carrying the request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tags each request with an id and a start timestamp
pub struct LbContextMiddleware;

impl LbContextMiddleware {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LbContextMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Middleware for LbContextMiddleware {
    async fn handle_request(
        &self,
        req: &mut http::request::Parts,
        ctx: &mut RequestContext,
    ) -> Result<Option<Response<Vec<u8>>>> {
        let existing = req
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let request_id = match existing {
            Some(id) => id,
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    req.headers.insert(REQUEST_ID_HEADER, value);
                }
                id
            }
        };

        ctx.request_id = Some(request_id);
        ctx.timestamp = Some(chrono::Utc::now());
        Ok(None)
    }

    async fn handle_response(
        &self,
        resp: &mut http::response::Parts,
        ctx: &RequestContext,
    ) -> Result<()> {
        if let Some(value) = ctx
            .request_id
            .as_deref()
            .and_then(|id| HeaderValue::from_str(id).ok())
        {
            resp.headers.insert(REQUEST_ID_HEADER, value);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "lb-context"
    }
}
