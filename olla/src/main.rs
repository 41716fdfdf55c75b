//! # Olla Binary
//!
//! Entry point: parse CLI args, load and validate config, build the router,
//! bind and serve. Grounded on the teacher's `main.rs` bootstrap sequence.
//!
//! ```bash
//! olla --config olla.toml
//! olla --host 0.0.0.0 --port 40114
//! olla --log-level debug
//! ```

use clap::Parser;
use olla::{config::Config, server::create_server};
use std::net::SocketAddr;

/// Command-line overrides for the TOML configuration.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "olla.toml")]
    config: String,

    /// Override `server.port`.
    #[arg(short, long)]
    port: Option<u16>,

    /// Override `server.host`.
    #[arg(long)]
    host: Option<String>,

    /// Override `logging.level`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    let mut config = Config::load(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let app = create_server(config).await?;

    tracing::info!("olla listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
