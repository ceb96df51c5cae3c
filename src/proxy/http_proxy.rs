//! HTTP reverse proxy — forwards requests to a backend instance
//!
//! Method, query, headers and body go upstream; status, headers and body come
//! back verbatim. `Host` and hop-by-hop headers are dropped in both directions,
//! and only POST, PUT and PATCH carry a body; other methods also lose their
//! body framing headers. There is no retry: a failed forward is reported to
//! the caller as a gateway error.

use crate::error::{GatewayError, Result};
use crate::service::ServiceInstance;
use bytes::Bytes;
use std::time::Duration;

/// HTTP reverse proxy
pub struct HttpProxy {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProxy {
    /// Create a new HTTP proxy with the given upstream timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(100)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, timeout })
    }

    /// Forward an HTTP request to `instance`, replacing the path with `backend_path`
    pub async fn forward(
        &self,
        instance: &ServiceInstance,
        method: &http::Method,
        backend_path: &str,
        query: Option<&str>,
        headers: &http::HeaderMap,
        body: Bytes,
    ) -> Result<ProxyResponse> {
        let upstream_url = upstream_url(&instance.address, backend_path, query);
        let mut req_builder = self.client.request(method.clone(), &upstream_url);
        let with_body = carries_body(method);

        for (key, value) in headers.iter() {
            if key == http::header::HOST || is_hop_by_hop(key.as_str()) {
                continue;
            }
            // The body is dropped below, so its length must not reach the backend
            if !with_body && is_body_framing(key) {
                continue;
            }
            req_builder = req_builder.header(key.clone(), value.clone());
        }

        if with_body {
            req_builder = req_builder.body(body);
        }

        let response = req_builder.send().await.map_err(|e| {
            tracing::warn!(
                instance = instance.address,
                url = upstream_url,
                error = %e,
                "Upstream request failed"
            );
            if e.is_timeout() {
                GatewayError::UpstreamTimeout(self.timeout.as_millis() as u64)
            } else if e.is_connect() {
                GatewayError::Upstream(format!(
                    "Cannot connect to backend {}: {}",
                    instance.address, e
                ))
            } else {
                GatewayError::Http(e)
            }
        })?;

        let status = response.status();
        let mut resp_headers = response.headers().clone();
        strip_hop_by_hop(&mut resp_headers);
        let resp_body = response.bytes().await.map_err(GatewayError::Http)?;

        Ok(ProxyResponse {
            status,
            headers: resp_headers,
            body: resp_body,
        })
    }
}

/// Response from an upstream backend
pub struct ProxyResponse {
    /// HTTP status code
    pub status: http::StatusCode,
    /// Response headers, hop-by-hop headers removed
    pub headers: http::HeaderMap,
    /// Response body
    pub body: Bytes,
}

/// Build the upstream URL from an instance base URL, a path and a raw query
fn upstream_url(address: &str, path: &str, query: Option<&str>) -> String {
    let base = address.trim_end_matches('/');
    match query {
        Some(q) if !q.is_empty() => format!("{}{}?{}", base, path, q),
        _ => format!("{}{}", base, path),
    }
}

/// Whether a request body is forwarded for this method
fn carries_body(method: &http::Method) -> bool {
    matches!(
        *method,
        http::Method::POST | http::Method::PUT | http::Method::PATCH
    )
}

fn is_body_framing(name: &http::HeaderName) -> bool {
    name == http::header::CONTENT_LENGTH || name == http::header::CONTENT_TYPE
}

/// Check if a header is a hop-by-hop header that should not be forwarded
pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

fn strip_hop_by_hop(headers: &mut http::HeaderMap) {
    let hop: Vec<http::HeaderName> = headers
        .keys()
        .filter(|k| is_hop_by_hop(k.as_str()))
        .cloned()
        .collect();
    for name in hop {
        headers.remove(name);
    }
}
