//! Prompt Bridge — relays HTTP prompts to connected browser clients.
//!
//! HTTP callers POST to `/send`; the server broadcasts the prompt to every
//! WebSocket client connected on `/ws` and streams the reply events back as
//! newline-delimited JSON. All state is in-memory and resets on restart.
//!
//! Usage:
//!   prompt-bridge                          # Default port 8765
//!   prompt-bridge --port 9000              # Custom port
//!   prompt-bridge --idle-timeout-secs 60   # Shorter reply timeout
//!   prompt-bridge --verbose                # Debug logging

use std::sync::Arc;
use std::time::Duration;

use bridge_core::{ConnectionRegistry, RequestCorrelator};
use bridge_transport::{TransportConfig, TransportServer};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "prompt-bridge", about = "Prompt Bridge — HTTP to WebSocket prompt relay")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "8765")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "0.0.0.0")]
    hostname: String,

    /// Seconds without a reply event before a request times out
    #[arg(long, default_value = "120")]
    idle_timeout_secs: u64,

    /// Maximum concurrent bridge client connections
    #[arg(long, default_value = "32")]
    max_connections: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Both registries start empty; nothing survives a restart.
    let registry = Arc::new(ConnectionRegistry::new());
    let correlator = Arc::new(RequestCorrelator::new());

    let config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        idle_timeout: Duration::from_secs(cli.idle_timeout_secs),
        max_connections: Some(cli.max_connections),
        enable_cors: true,
    };

    let mut transport = match TransportServer::start(config, registry, correlator).await {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    let actual_port = transport.port();
    println!();
    println!("  Prompt Bridge running!");
    println!();
    println!("  Client endpoint:   ws://{}:{}/ws", cli.hostname, actual_port);
    println!("  Prompt intake:     POST http://{}:{}/send", cli.hostname, actual_port);
    println!("  Health:            GET  http://{}:{}/health", cli.hostname, actual_port);
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c().await.ok();

    println!();
    println!("  Shutting down...");
    transport.stop().await;
    println!("  Server stopped.");
}
