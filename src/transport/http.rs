//! HTTP front of the server listener
//!
//! Every accepted connection is served as HTTP/1.1. WebSocket upgrades
//! become tunnels; anything else gets a fixed `Hello world` page so the port
//! doubles as a health check.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, CONNECTION, CONTENT_TYPE, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

/// Largest request head buffered before the connection is refused
pub const MAX_REQUEST_HEAD: usize = 8192;

/// Time allowed for a client to finish sending its request head
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of the reply to plain HTTP requests
pub const HELLO_BODY: &str = "Hello world";

/// Tunnel accepted by the server listener
pub type ServerTunnel = WebSocketStream<TokioIo<Upgraded>>;

/// Upgrade handed from the request service back to the connection owner
type UpgradeSlot = Arc<Mutex<Option<OnUpgrade>>>;

fn wants_websocket(req: &Request<Incoming>) -> bool {
    req.method() == Method::GET
        && req
            .headers()
            .get(UPGRADE)
            .and_then(|value| value.to_str().ok())
            .map_or(false, |value| value.trim().eq_ignore_ascii_case("websocket"))
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

fn respond(mut req: Request<Incoming>, slot: &UpgradeSlot) -> Response<Full<Bytes>> {
    if !wants_websocket(&req) {
        debug!("Answering plain HTTP request for {}", req.uri());
        return plain_response(StatusCode::OK, HELLO_BODY);
    }

    let accept = req
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .map(|key| derive_accept_key(key.as_bytes()))
        .and_then(|accept| HeaderValue::from_str(&accept).ok());
    let Some(accept) = accept else {
        debug!("WebSocket upgrade without a usable key");
        return plain_response(StatusCode::BAD_REQUEST, "Bad Request");
    };

    *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(hyper::upgrade::on(&mut req));

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, accept);
    response
}

/// Serve one accepted connection until it either upgrades to a WebSocket or
/// finishes as plain HTTP
///
/// Returns `Ok(None)` when the connection was answered with the `Hello world`
/// page or closed before sending a request.
pub async fn accept_tunnel<S>(stream: S) -> Result<Option<ServerTunnel>, hyper::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let slot = UpgradeSlot::default();
    let service = {
        let slot = Arc::clone(&slot);
        service_fn(move |req: Request<Incoming>| {
            let response = respond(req, &slot);
            async move { Ok::<_, Infallible>(response) }
        })
    };

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(HEADER_READ_TIMEOUT)
        .max_buf_size(MAX_REQUEST_HEAD);
    builder
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await?;

    let pending = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
    let Some(pending) = pending else {
        trace!("HTTP connection finished without an upgrade");
        return Ok(None);
    };

    let upgraded = pending.await?;
    let tunnel = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
    Ok(Some(tunnel))
}
