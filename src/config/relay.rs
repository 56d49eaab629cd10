//! Relay configuration types
//!
//! One flat structure serves both sides; the mode decides which address pair
//! is listened on.

use super::TcpConfig;
use crate::crypto::CipherKind;
use crate::error::RelayError;
use crate::helper::duration_from_secs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

fn default_local_address() -> String {
    "127.0.0.1".to_string()
}

fn default_local_port() -> u16 {
    1080
}

fn default_server_address() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8088
}

fn default_password() -> String {
    "shadowsocks-over-websocket".to_string()
}

fn default_method() -> String {
    "rc4-md5".to_string()
}

fn default_max_connections() -> u32 {
    crate::session::MAX_CONNECTIONS
}

/// Default idle timeout in seconds
fn default_idle_timeout() -> u64 {
    600
}

/// Default keepalive interval in seconds
fn default_keepalive_interval() -> u64 {
    50
}

/// Which side of the tunnel a relay runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// SOCKS5 listener forwarding into the tunnel
    Local,
    /// Tunnel listener forwarding to destinations
    Server,
}

impl fmt::Display for RelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayMode::Local => write!(f, "local"),
            RelayMode::Server => write!(f, "server"),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// SOCKS5 listen address (local side)
    #[serde(default = "default_local_address")]
    pub local_address: String,

    /// SOCKS5 listen port (local side)
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Tunnel server address; the listen address on the server side
    #[serde(default = "default_server_address")]
    pub server_address: String,

    /// Tunnel server port
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Shared secret the cipher key is derived from
    #[serde(default = "default_password")]
    pub password: String,

    /// Cipher method name, e.g. "aes-256-cfb"
    #[serde(default = "default_method")]
    pub method: String,

    /// Concurrent session bound and id wrap point
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds without traffic before a local session is dropped
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,

    /// Seconds between tunnel pings on the local side
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,

    /// Socket options
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            local_address: default_local_address(),
            local_port: default_local_port(),
            server_address: default_server_address(),
            server_port: default_server_port(),
            password: default_password(),
            method: default_method(),
            max_connections: default_max_connections(),
            idle_timeout: default_idle_timeout(),
            keepalive_interval: default_keepalive_interval(),
            tcp: TcpConfig::default(),
        }
    }
}

impl Config {
    /// Defaults for `mode`; the server side listens on all interfaces
    pub fn for_mode(mode: RelayMode) -> Self {
        match mode {
            RelayMode::Local => Config::default(),
            RelayMode::Server => Config {
                server_address: "0.0.0.0".to_string(),
                ..Config::default()
            },
        }
    }

    /// Check values that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<(), RelayError> {
        self.method.parse::<CipherKind>()?;

        if self.password.is_empty() {
            return Err(RelayError::Config("password must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(RelayError::Config(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout == 0 {
            return Err(RelayError::Config(
                "idle_timeout must be greater than zero".to_string(),
            ));
        }
        if self.keepalive_interval == 0 {
            return Err(RelayError::Config(
                "keepalive_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Address the relay binds in `mode`
    pub fn listen_addr(&self, mode: RelayMode) -> String {
        match mode {
            RelayMode::Local => join_host_port(&self.local_address, self.local_port),
            RelayMode::Server => join_host_port(&self.server_address, self.server_port),
        }
    }

    /// WebSocket endpoint of the tunnel server
    pub fn tunnel_url(&self) -> Result<Url, RelayError> {
        let raw = format!(
            "ws://{}/",
            join_host_port(&self.server_address, self.server_port)
        );
        Url::parse(&raw).map_err(|e| RelayError::Config(format!("Invalid tunnel URL {}: {}", raw, e)))
    }

    /// Idle timeout as a duration
    pub fn idle_timeout(&self) -> Duration {
        duration_from_secs(self.idle_timeout)
    }

    /// Keepalive interval as a duration
    pub fn keepalive_interval(&self) -> Duration {
        duration_from_secs(self.keepalive_interval)
    }
}

/// `host:port`, bracketing IPv6 literals
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
