//! Test utilities for Socksws
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use socksws::{Config, RelayMode, TcpRelay};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Spawn a server that echoes every connection back to itself
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let (mut rx, mut tx) = stream.split();
                let _ = tokio::io::copy(&mut rx, &mut tx).await;
            });
        }
    });
    addr
}

/// Test configuration builder
pub struct TestConfigBuilder {
    method: String,
    password: String,
    max_connections: u32,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            method: "aes-256-cfb".to_string(),
            password: "test-password".to_string(),
            max_connections: 64,
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cipher method
    pub fn method(mut self, method: &str) -> Self {
        self.method = method.to_string();
        self
    }

    /// Set password
    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }

    /// Set connection limit
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Loopback configuration on ephemeral ports, tunneling to `server`
    pub fn build(self, server: Option<SocketAddr>) -> Config {
        Config {
            local_address: "127.0.0.1".to_string(),
            local_port: 0,
            server_address: "127.0.0.1".to_string(),
            server_port: server.map(|addr| addr.port()).unwrap_or(0),
            password: self.password,
            method: self.method,
            max_connections: self.max_connections,
            ..Config::default()
        }
    }
}

/// A running server relay and a local relay pointed at it
pub struct RelayPair {
    pub server: TcpRelay,
    pub local: TcpRelay,
    pub socks_addr: SocketAddr,
}

impl RelayPair {
    /// Start both relays with the same cipher settings
    pub async fn start(builder: impl Fn() -> TestConfigBuilder) -> Self {
        let server = TcpRelay::new(builder().build(None), RelayMode::Server).unwrap();
        let server_addr = server.init_server().await.unwrap();

        let local = TcpRelay::new(builder().build(Some(server_addr)), RelayMode::Local).unwrap();
        let socks_addr = local.init_server().await.unwrap();

        RelayPair {
            server,
            local,
            socks_addr,
        }
    }

    /// Stop the local relay, then the server relay
    pub async fn stop(&self) {
        self.local.stop().await;
        self.server.stop().await;
    }
}

/// SOCKS5 CONNECT request for an IPv4 target
pub fn connect_request(target: SocketAddr) -> Vec<u8> {
    let SocketAddr::V4(v4) = target else {
        panic!("IPv4 target expected");
    };
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend_from_slice(&v4.ip().octets());
    request.extend_from_slice(&v4.port().to_be_bytes());
    request
}

/// SOCKS5 CONNECT request for a domain target
pub fn connect_domain_request(host: &str, port: u16) -> Vec<u8> {
    let mut request = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// Complete the greeting and send `request`, returning the reply
pub async fn socks_handshake(stream: &mut TcpStream, request: &[u8]) -> [u8; 10] {
    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut greeting = [0u8; 2];
    stream.read_exact(&mut greeting).await.unwrap();
    assert_eq!(greeting, [0x05, 0x00]);

    stream.write_all(request).await.unwrap();
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();
    reply
}

/// Open a SOCKS5 connection to `target` through `socks_addr`
pub async fn socks_connect(socks_addr: SocketAddr, target: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(socks_addr).await.unwrap();
    let reply = socks_handshake(&mut stream, &connect_request(target)).await;
    assert_eq!(reply, [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
    stream
}
