//! WebSocket relay — bidirectional stream between a client and a backend
//!
//! The gateway answers the client handshake itself (`101 Switching Protocols`),
//! then connects to a randomly chosen stream target once hyper hands over the
//! upgraded connection. Two pumps forward frames unmodified, one per direction;
//! the relay ends as soon as either pump ends and both sides are closed.

use crate::config::StreamConfig;
use crate::error::{GatewayError, Result};
use crate::middleware::json_response;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use http::{HeaderValue, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Check if an HTTP request is a WebSocket upgrade request
pub fn is_websocket_upgrade(headers: &http::HeaderMap) -> bool {
    headers
        .get(http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

/// Build the backend WebSocket URL from a target and the client request URI
pub fn build_ws_url(target: &str, uri: &http::Uri) -> String {
    let target = target.trim_end_matches('/');
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    let ws_url = if let Some(rest) = target.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = target.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if target.starts_with("ws://") || target.starts_with("wss://") {
        target.to_string()
    } else {
        format!("ws://{}", target)
    };

    format!("{}{}", ws_url, path)
}

/// Which side ended a relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// The client sent Close or its stream ended
    ClientClosed,
    /// The backend sent Close or its stream ended
    BackendClosed,
    /// A read or write failed
    Error(String),
}

enum PumpEnd {
    Closed,
    Error(String),
}

/// Forward every message from `source` to `sink` until Close, EOF or error
async fn pump<S, K>(source: &mut S, sink: &mut K) -> PumpEnd
where
    S: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    K: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Close(frame)) => {
                let _ = sink.send(Message::Close(frame)).await;
                return PumpEnd::Closed;
            }
            Ok(msg) => {
                if let Err(e) = sink.send(msg).await {
                    return PumpEnd::Error(e.to_string());
                }
            }
            Err(e) => return PumpEnd::Error(e.to_string()),
        }
    }
    PumpEnd::Closed
}

/// Relay messages bidirectionally between two WebSocket streams
pub async fn relay_websocket<C, U>(client: WebSocketStream<C>, upstream: WebSocketStream<U>) -> RelayEnd
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let end = tokio::select! {
        end = pump(&mut client_rx, &mut upstream_tx) => match end {
            PumpEnd::Closed => RelayEnd::ClientClosed,
            PumpEnd::Error(e) => RelayEnd::Error(e),
        },
        end = pump(&mut upstream_rx, &mut client_tx) => match end {
            PumpEnd::Closed => RelayEnd::BackendClosed,
            PumpEnd::Error(e) => RelayEnd::Error(e),
        },
    };

    // Best-effort close both sides
    let _ = client_tx.close().await;
    let _ = upstream_tx.close().await;
    end
}

/// Connect to a backend WebSocket server
pub async fn connect_upstream(url: &str) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let (ws_stream, _response) = connect_async(url).await.map_err(|e| {
        GatewayError::Upstream(format!("WebSocket upstream connection failed: {}", e))
    })?;
    Ok(ws_stream)
}

/// Stream relay endpoint
pub struct StreamRelay {
    path: String,
    targets: Vec<String>,
}

impl StreamRelay {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            path: config.path.clone(),
            targets: config.targets.clone(),
        }
    }

    /// Inbound path served by the relay
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Random stream target, `None` when none is configured
    pub fn pick_target(&self) -> Option<&str> {
        if self.targets.is_empty() {
            return None;
        }
        let idx = rand::random::<usize>() % self.targets.len();
        self.targets.get(idx).map(String::as_str)
    }

    /// Answer a client handshake.
    ///
    /// On success returns `101` and spawns the relay, which starts once hyper
    /// completes the upgrade. Otherwise returns `400` or `503`.
    pub fn upgrade<B>(&self, mut req: Request<B>) -> Response<Vec<u8>> {
        if !is_websocket_upgrade(req.headers()) {
            return json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({ "error": "Expected WebSocket upgrade" }),
            );
        }

        let Some(key) = req.headers().get(http::header::SEC_WEBSOCKET_KEY) else {
            return json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({ "error": "Missing Sec-WebSocket-Key" }),
            );
        };
        let accept = derive_accept_key(key.as_bytes());

        let Some(target) = self.pick_target() else {
            return json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &serde_json::json!({ "error": "No stream targets configured" }),
            );
        };
        let url = build_ws_url(target, req.uri());

        let on_upgrade = hyper::upgrade::on(&mut req);
        tokio::spawn(async move {
            let upgraded = match on_upgrade.await {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket upgrade failed");
                    return;
                }
            };
            let mut client =
                WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;

            let upstream = match connect_upstream(&url).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    tracing::warn!(url = url, error = %e, "Stream target unavailable");
                    let _ = client
                        .close(Some(CloseFrame {
                            code: CloseCode::Error,
                            reason: "backend unavailable".into(),
                        }))
                        .await;
                    return;
                }
            };

            tracing::debug!(url = url, "WebSocket relay started");
            let end = relay_websocket(client, upstream).await;
            tracing::debug!(url = url, end = ?end, "WebSocket relay ended");
        });

        let mut resp = Response::new(Vec::new());
        *resp.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        let headers = resp.headers_mut();
        headers.insert(http::header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(http::header::UPGRADE, HeaderValue::from_static("websocket"));
        if let Ok(value) = HeaderValue::from_str(&accept) {
            headers.insert(http::header::SEC_WEBSOCKET_ACCEPT, value);
        }
        resp
    }
}
