//! # E-Paper Server
//!
//! Serves battery-powered e-paper displays: answers their polls, records
//! their telemetry and hands out bitmaps with a status footer.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse the command line, load and validate `server.toml`
//!    - Create `logs/`, `db/` and `ssl/` in the data directory
//!    - Set up logging with the tracing subscriber
//!    - Open the settings document and journals
//!
//! 2. **Serving**
//!    - HTTP or HTTPS until Ctrl+C or SIGTERM
//!
//! 3. **Graceful Shutdown**
//!    - Let open requests finish within the grace period
//!    - Flush all three journals
//!
//! Expected output:
//! ```text
//! INFO epaper_server: E-Paper Server v0.1.0 starting...
//! INFO epaper_server: Data directory: /srv/epaper
//! INFO epaper_server::server: Listening on https://0.0.0.0:1184
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::net::UdpSocket;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use epaper_server::config::Config;
use epaper_server::service::DisplayService;
use epaper_server::{logging, server};

/// Directories created inside the data directory on start
const DATA_SUBDIRS: [&str; 3] = ["logs", "db", "ssl"];

/// Poll server for battery-powered e-paper displays
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Data directory holding settings, journals and certificates
    #[arg(default_value = ".")]
    data_dir: PathBuf,

    /// Path to the server configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// Address of the interface that routes to the outside world.
///
/// No packet is sent; connecting a UDP socket only selects a route.
fn discover_local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    for dir in DATA_SUBDIRS {
        let path = cli.data_dir.join(dir);
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
    }

    let _log_guard = logging::init(&config.logging, &cli.data_dir.join("logs"));

    info!("E-Paper Server v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {}", cli.data_dir.display());

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A TLS crypto provider was already installed");
    }

    let public_host = match config.server.public_host.clone() {
        Some(host) => host,
        None => discover_local_ip().unwrap_or_else(|| {
            warn!("Could not determine the local IP address, using 127.0.0.1");
            "127.0.0.1".to_string()
        }),
    };

    let service = Arc::new(
        DisplayService::open(config, &cli.data_dir, &public_host)
            .context("failed to open the display service")?,
    );
    info!("Devices are pointed at {}", service.base_url());

    let result = server::serve(Arc::clone(&service), shutdown_signal()).await;

    service.drain().await;
    info!("Shutdown complete");

    result.context("HTTP server failed")
}
