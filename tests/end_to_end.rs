//! End-to-end tests: SOCKS5 client -> local relay -> tunnel -> server relay -> destination

mod common;

use common::*;
use socksws::crypto::CipherKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

async fn echo_round_trip(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_all(payload).await.unwrap();
    let mut received = vec![0u8; payload.len()];
    timeout(WAIT, stream.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, payload);
}

#[tokio::test]
async fn test_echo_through_tunnel() {
    let echo = spawn_echo_server().await;
    let relays = RelayPair::start(TestConfigBuilder::new).await;

    let mut stream = socks_connect(relays.socks_addr, echo).await;
    echo_round_trip(&mut stream, b"hello through the tunnel").await;

    // Larger than one read buffer, so it spans several frames
    let big: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    echo_round_trip(&mut stream, &big).await;

    drop(stream);
    relays.stop().await;
}

#[tokio::test]
async fn test_every_cipher_method() {
    let echo = spawn_echo_server().await;

    for kind in CipherKind::ALL {
        let relays = RelayPair::start(|| TestConfigBuilder::new().method(kind.as_str())).await;
        let mut stream = socks_connect(relays.socks_addr, echo).await;
        echo_round_trip(&mut stream, kind.as_str().as_bytes()).await;
        drop(stream);
        relays.stop().await;
    }
}

#[tokio::test]
async fn test_payload_in_request_is_delivered() {
    let echo = spawn_echo_server().await;
    let relays = RelayPair::start(TestConfigBuilder::new).await;

    let mut stream = TcpStream::connect(relays.socks_addr).await.unwrap();
    let mut request = connect_request(echo);
    request.extend_from_slice(b"early");
    let reply = socks_handshake(&mut stream, &request).await;
    assert_eq!(reply[1], 0x00);

    // Sent before the tunnel is necessarily up
    stream.write_all(b" bytes").await.unwrap();

    let mut received = [0u8; 11];
    timeout(WAIT, stream.read_exact(&mut received))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&received, b"early bytes");

    relays.stop().await;
}

#[tokio::test]
async fn test_domain_target() {
    let echo = spawn_echo_server().await;
    let relays = RelayPair::start(TestConfigBuilder::new).await;

    let mut stream = TcpStream::connect(relays.socks_addr).await.unwrap();
    let reply = socks_handshake(&mut stream, &connect_domain_request("localhost", echo.port())).await;
    assert_eq!(reply[1], 0x00);

    // localhost may resolve to ::1 first where nothing listens; only check
    // that the session either echoes or closes cleanly
    stream.write_all(b"ping").await.unwrap();
    let mut received = Vec::new();
    let _ = timeout(WAIT, stream.read_buf(&mut received)).await;
    assert!(received.is_empty() || received == b"ping");

    relays.stop().await;
}

#[tokio::test]
async fn test_udp_associate_rejected() {
    let relays = RelayPair::start(TestConfigBuilder::new).await;

    let mut stream = TcpStream::connect(relays.socks_addr).await.unwrap();
    let request = [0x05, 0x03, 0x00, 0x01, 127, 0, 0, 1, 0, 53];
    let reply = socks_handshake(&mut stream, &request).await;
    assert_eq!(reply, [0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

    let mut rest = Vec::new();
    let n = timeout(WAIT, stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);

    relays.stop().await;
}

#[tokio::test]
async fn test_bad_greeting_closes_without_reply() {
    let relays = RelayPair::start(TestConfigBuilder::new).await;

    let mut stream = TcpStream::connect(relays.socks_addr).await.unwrap();
    stream.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

    let mut rest = Vec::new();
    let n = timeout(WAIT, stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);

    relays.stop().await;
}

#[tokio::test]
async fn test_destination_close_reaches_client() {
    let (listener, target) = create_test_listener().await;
    let relays = RelayPair::start(TestConfigBuilder::new).await;

    let mut stream = socks_connect(relays.socks_addr, target).await;
    let (mut dest, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();

    dest.write_all(b"bye").await.unwrap();
    drop(dest);

    let mut received = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut received))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(received, b"bye");

    // Both sides unregister once torn down
    timeout(WAIT, async {
        while relays.local.registry().active_count() > 0
            || relays.server.registry().active_count() > 0
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    relays.stop().await;
}

#[tokio::test]
async fn test_unreachable_destination_closes_client() {
    let (listener, target) = create_test_listener().await;
    drop(listener);
    let relays = RelayPair::start(TestConfigBuilder::new).await;

    // The success reply is sent before the destination is known to be reachable
    let mut stream = socks_connect(relays.socks_addr, target).await;

    let mut rest = Vec::new();
    let n = timeout(WAIT, stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);

    relays.stop().await;
}

#[tokio::test]
async fn test_password_mismatch_never_reaches_destination() {
    let (listener, target) = create_test_listener().await;

    let server = socksws::TcpRelay::new(
        TestConfigBuilder::new().password("one").build(None),
        socksws::RelayMode::Server,
    )
    .unwrap();
    let server_addr = server.init_server().await.unwrap();
    let local = socksws::TcpRelay::new(
        TestConfigBuilder::new().password("two").build(Some(server_addr)),
        socksws::RelayMode::Local,
    )
    .unwrap();
    let socks_addr = local.init_server().await.unwrap();

    let mut stream = socks_connect(socks_addr, target).await;
    stream.write_all(b"data").await.unwrap();

    // The garbled header parses as nothing useful; no connection with our
    // payload arrives in time
    let accepted = timeout(Duration::from_millis(500), listener.accept()).await;
    if let Ok(Ok((mut dest, _))) = accepted {
        let mut buf = [0u8; 4];
        let got = timeout(Duration::from_millis(500), dest.read_exact(&mut buf)).await;
        assert!(!matches!(got, Ok(Ok(_)) if &buf == b"data"));
    }

    local.stop().await;
    server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_streaming_sessions() {
    let echo = spawn_echo_server().await;
    let relays = RelayPair::start(TestConfigBuilder::new).await;

    let mut streams = Vec::new();
    for _ in 0..3 {
        let mut stream = socks_connect(relays.socks_addr, echo).await;
        echo_round_trip(&mut stream, b"up").await;
        streams.push(stream);
    }
    assert_eq!(relays.local.registry().active_count(), 3);

    timeout(WAIT, relays.stop()).await.unwrap();
    assert_eq!(relays.local.registry().active_count(), 0);
    assert_eq!(relays.server.registry().active_count(), 0);

    for mut stream in streams {
        let mut rest = Vec::new();
        let n = timeout(WAIT, stream.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}

#[tokio::test]
async fn test_server_plain_http_hello() {
    let relays = RelayPair::start(TestConfigBuilder::new).await;
    let server_addr = relays.server.local_addr().unwrap();

    let mut stream = TcpStream::connect(server_addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: example\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("\r\n\r\nHello world"));

    relays.stop().await;
}

#[tokio::test]
async fn test_server_bare_lf_http10_hello() {
    let relays = RelayPair::start(TestConfigBuilder::new).await;
    let server_addr = relays.server.local_addr().unwrap();

    let mut stream = TcpStream::connect(server_addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.0\nHost: x\n\n").await.unwrap();
    let mut response = String::new();
    timeout(WAIT, stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert!(response.contains(" 200 OK\r\n"));
    assert!(response.ends_with("Hello world"));

    relays.stop().await;
}
