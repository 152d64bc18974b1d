//! Slate broker binary.
//!
//! # Usage
//!
//! ```bash
//! # Ephemeral canvases, self-signed certificate (development)
//! slate-server --bind 0.0.0.0:4433
//!
//! # Durable canvases and a real TLS certificate (production)
//! slate-server --bind 0.0.0.0:4433 --data-dir /var/lib/slate \
//!     --cert cert.pem --key key.pem
//! ```

use std::path::PathBuf;

use clap::Parser;
use slate_server::{
    MemoryDirectory, MemoryStorage, RedbStorage, RelayConfig, RoomDirectory, Server,
    ServerRuntimeConfig, Storage,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Slate whiteboard broker
#[derive(Parser, Debug)]
#[command(name = "slate-server")]
#[command(about = "Room-scoped real-time whiteboard broker")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Directory for durable canvas storage (omit for in-memory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("slate broker starting");
    tracing::info!("binding to {}", args.bind);

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("no TLS certificate provided - using self-signed certificate");
        tracing::warn!("this is NOT suitable for production use!");
    }

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        relay: RelayConfig { max_connections: args.max_connections, ..Default::default() },
    };

    // Membership data is published by the HTTP layer through the control
    // handle; the broker itself starts with an empty directory.
    let directory = MemoryDirectory::new();

    match args.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let storage = RedbStorage::open(dir.join("canvases.redb"))?;
            tracing::info!("durable canvas storage at {}", dir.display());
            serve(config, storage, directory).await
        },
        None => {
            tracing::info!("using in-memory canvas storage (canvases do not survive restart)");
            serve(config, MemoryStorage::new(), directory).await
        },
    }
}

async fn serve<S: Storage, D: RoomDirectory>(
    config: ServerRuntimeConfig,
    storage: S,
    directory: D,
) -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::bind(config, storage, directory)?;

    tracing::info!("listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
