//! Proxy layer — HTTP forwarding and WebSocket relaying to backends

pub mod http_proxy;
pub mod websocket;

pub use http_proxy::HttpProxy;
pub use websocket::StreamRelay;
