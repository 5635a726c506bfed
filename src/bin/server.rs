//! QLE - TCP Server

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qle::config::{Config, DatabaseLocation};
use qle::server::{Server, ServerConfig, DEFAULT_PORT};
use qle::Lineage;

#[derive(Debug, Parser)]
#[command(name = "qle-server", version, about = "Serve query lineage sessions over TCP")]
struct Args {
    /// JSON config file
    #[arg(long, env = "QLE_CONFIG")]
    config: Option<PathBuf>,

    /// Database location: a file path, sqlite://<path> or :memory:
    #[arg(long)]
    database: Option<DatabaseLocation>,

    /// Records listed by `.history` when no count is given
    #[arg(long)]
    history_limit: Option<usize>,

    /// Rows shown by `.preview` when no count is given
    #[arg(long)]
    preview_limit: Option<usize>,

    /// Host address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Maximum concurrent connections
    #[arg(long, default_value_t = 100)]
    max_connections: usize,
}

impl Args {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => Config::new(),
        }
        .apply_env()?;
        if let Some(database) = &self.database {
            config = config.database(database.clone());
        }
        if let Some(limit) = self.history_limit {
            config = config.history_limit(limit);
        }
        if let Some(limit) = self.preview_limit {
            config = config.preview_limit(limit);
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.load_config()?;
    info!(database = %config.database, "opening catalog");
    let lineage = Arc::new(Lineage::open(config)?);

    let server_config = ServerConfig::new()
        .host(args.host.clone())
        .port(args.port)
        .max_connections(args.max_connections);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let server = Server::new(server_config, lineage);
        tokio::select! {
            result = server.start() => result.map_err(anyhow::Error::from),
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                Ok(())
            }
        }
    })
}
