//! Socksws - SOCKS5 over an encrypted WebSocket tunnel
//!
//! This is the main entry point for the Socksws application.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use socksws::config::load_config;
use socksws::{Config, RelayMode, TcpRelay};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Socksws - SOCKS5 proxy tunneled over an encrypted WebSocket
#[derive(Parser, Debug)]
#[command(name = "socksws")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long, global = true)]
    json_log: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the SOCKS5 side that forwards into the tunnel
    Local {
        #[command(flatten)]
        common: CommonArgs,

        /// Tunnel server port
        #[arg(short = 'p', long)]
        server_port: Option<u16>,
    },
    /// Run the tunnel side that connects to destinations
    Server {
        #[command(flatten)]
        common: CommonArgs,

        /// Port to listen on for tunnels
        #[arg(short = 'p', long, env = "PORT")]
        server_port: Option<u16>,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cipher method, e.g. aes-256-cfb
    #[arg(short, long)]
    method: Option<String>,

    /// Shared password
    #[arg(short = 'k', long)]
    password: Option<String>,

    /// Tunnel server address
    #[arg(short, long)]
    server_address: Option<String>,

    /// SOCKS5 listen address
    #[arg(short = 'b', long)]
    local_address: Option<String>,

    /// SOCKS5 listen port
    #[arg(short = 'l', long)]
    local_port: Option<u16>,
}

impl CommonArgs {
    /// Command-line values over file values over mode defaults
    fn resolve(&self, mode: RelayMode, server_port: Option<u16>) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let config = load_config(path)?;
                info!("Configuration loaded from: {:?}", path);
                config
            }
            None => Config::for_mode(mode),
        };

        if let Some(method) = &self.method {
            config.method = method.clone();
        }
        if let Some(password) = &self.password {
            config.password = password.clone();
        }
        if let Some(address) = &self.server_address {
            config.server_address = address.clone();
        }
        if let Some(port) = server_port {
            config.server_port = port;
        }
        if let Some(address) = &self.local_address {
            config.local_address = address.clone();
        }
        if let Some(port) = self.local_port {
            config.local_port = port;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.log_level, cli.json_log)?;

    let (mode, config) = match &cli.command {
        Command::Local {
            common,
            server_port,
        } => (RelayMode::Local, common.resolve(RelayMode::Local, *server_port)?),
        Command::Server {
            common,
            server_port,
        } => (RelayMode::Server, common.resolve(RelayMode::Server, *server_port)?),
    };

    info!("Socksws v{} ({} mode)", socksws::VERSION, mode);
    info!("Cipher method: {}", config.method);

    let relay = TcpRelay::new(config, mode)?;
    relay.init_server().await?;

    wait_for_shutdown().await?;
    relay.stop().await;
    Ok(())
}

/// Resolve on Ctrl+C, or SIGTERM on unix
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

/// Setup logging; `RUST_LOG` overrides `level`
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
