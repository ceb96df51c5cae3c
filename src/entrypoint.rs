//! Entrypoint — the HTTP listener and per-request dispatch
//!
//! Every request goes through the middleware pipeline, then to the status API,
//! the stream relay or the router + proxy. The response phase of the pipeline
//! runs on whatever comes back, including short-circuit and error responses.

use crate::dashboard::DashboardApi;
use crate::error::{GatewayError, Result};
use crate::middleware::{json_response, Pipeline, RequestContext};
use crate::proxy::{HttpProxy, StreamRelay};
use crate::router::RouterTable;
use crate::service::ServiceRegistry;
use bytes::Bytes;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Shared state for request handling
pub struct SharedState {
    pub pipeline: Pipeline,
    pub router_table: RouterTable,
    pub service_registry: Arc<ServiceRegistry>,
    pub http_proxy: HttpProxy,
    pub relay: StreamRelay,
    pub dashboard: DashboardApi,
    /// Key clients by `X-Forwarded-For` instead of the peer address
    pub trust_forwarded_for: bool,
}

/// Accept connections on `listener` until the shutdown signal flips to `true`
pub fn start_http_entrypoint(
    listener: TcpListener,
    state: Arc<SharedState>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let state = state.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                if let Err(e) = http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(|req| handle_http_request(req, remote_addr, state.clone())),
                    )
                    .with_upgrades()
                    .await
                {
                    tracing::debug!(error = %e, remote = %remote_addr, "Connection ended with error");
                }
            });
        }
        tracing::debug!("HTTP entrypoint stopped");
    })
}

/// Handle a single HTTP request
async fn handle_http_request(
    req: Request<Incoming>,
    remote_addr: SocketAddr,
    state: Arc<SharedState>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (mut parts, body) = req.into_parts();
    let mut ctx = RequestContext::new(&parts, remote_addr, state.trust_forwarded_for);

    let response = match state.pipeline.process_request(&mut parts, &mut ctx).await {
        Ok(Some(short_circuit)) => short_circuit,
        Ok(None) => match dispatch(parts, body, &state).await {
            Ok(resp) => resp,
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    };

    let (mut resp_parts, resp_body) = response.into_parts();
    if let Err(e) = state.pipeline.process_response(&mut resp_parts, &ctx).await {
        tracing::warn!(error = %e, "Response middleware failed");
    }
    Ok(Response::from_parts(resp_parts, Full::new(Bytes::from(resp_body))))
}

/// Route a request that passed the request phase
async fn dispatch(
    parts: http::request::Parts,
    body: Incoming,
    state: &SharedState,
) -> Result<Response<Vec<u8>>> {
    let path = parts.uri.path().to_string();

    if state.dashboard.matches(&path) {
        if let Some(resp) = state.dashboard.handle(&path) {
            return Ok(dashboard_response(resp));
        }
    }

    if path == state.relay.path() {
        return Ok(state.relay.upgrade(Request::from_parts(parts, ())));
    }

    let route = state.router_table.match_path(&path);
    let instance = state.service_registry.select_instance(&route.service_name)?;
    tracing::debug!(
        router = route.router_name,
        service = route.service_name,
        instance = instance.address,
        backend_path = route.backend_path,
        "Forwarding request"
    );

    let body = body
        .collect()
        .await
        .map_err(|e| GatewayError::Other(format!("Failed to read request body: {}", e)))?
        .to_bytes();

    let upstream = state
        .http_proxy
        .forward(
            &instance,
            &parts.method,
            &route.backend_path,
            parts.uri.query(),
            &parts.headers,
            body,
        )
        .await?;

    let mut resp = Response::new(upstream.body.to_vec());
    *resp.status_mut() = upstream.status;
    *resp.headers_mut() = upstream.headers;
    Ok(resp)
}

fn dashboard_response(resp: crate::dashboard::DashboardResponse) -> Response<Vec<u8>> {
    let mut out = Response::new(resp.body.into_bytes());
    *out.status_mut() = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::OK);
    if let Ok(value) = HeaderValue::from_str(&resp.content_type) {
        out.headers_mut().insert(http::header::CONTENT_TYPE, value);
    }
    out
}

/// Map a gateway error to its client-facing JSON response
fn error_response(err: &GatewayError) -> Response<Vec<u8>> {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
        tracing::warn!(error = %err, status = status.as_u16(), "Request failed");
    } else {
        tracing::debug!(error = %err, status = status.as_u16(), "Request rejected");
    }
    json_response(status, &err.to_json())
}
