//! TCP Server for QLE
//!
//! Line protocol: every line a client sends is one input for its own
//! [`Session`]; the reply text is written back as-is. Sessions share one
//! [`Lineage`] service, and every input runs on the blocking pool since the
//! catalog and engine calls are synchronous.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::lineage::Lineage;
use crate::session::{Reply, Session};

/// Default server port
pub const DEFAULT_PORT: u16 = 7272;

/// Greeting sent to every client on connect
pub const WELCOME: &str = "QLE Server v0.1.0\nReady for queries. Type '.help' for commands.\n";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_connections: 100,
        }
    }
}

impl ServerConfig {
    /// Create a new server config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host address
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connection limit
    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Get the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// QLE TCP Server
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    lineage: Arc<Lineage>,
}

impl Server {
    /// Create a new server over a lineage service
    pub fn new(config: ServerConfig, lineage: Arc<Lineage>) -> Self {
        Self { config, lineage }
    }

    /// Bind the configured address and serve until the task is cancelled
    pub async fn start(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_address()).await?;
        info!(address = %self.config.bind_address(), "server listening");
        self.serve(listener).await
    }

    /// Accept connections on a bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.config.max_connections.max(1)));

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            let permit = match permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(%peer, "connection limit reached, refusing client");
                    let mut stream = stream;
                    let _ = stream.write_all(b"Error: too many connections\n").await;
                    continue;
                }
            };

            let lineage = self.lineage.clone();
            tokio::spawn(async move {
                info!(%peer, "client connected");
                if let Err(e) = handle_connection(stream, lineage).await {
                    warn!(%peer, error = %e, "connection error");
                }
                info!(%peer, "client disconnected");
                drop(permit);
            });
        }
    }
}

/// Handle a client connection
async fn handle_connection(stream: TcpStream, lineage: Arc<Lineage>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut session = Session::new(lineage);

    writer.write_all(WELCOME.as_bytes()).await?;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!(input = %line, "received input");

        let (returned, reply) = tokio::task::spawn_blocking(move || {
            let reply = session.handle(&line);
            (session, reply)
        })
        .await
        .map_err(|e| Error::Internal(format!("join error: {}", e)))?;
        session = returned;

        writer.write_all(reply.text().as_bytes()).await?;
        writer.flush().await?;
        if let Reply::Quit(_) = reply {
            break;
        }
    }

    Ok(())
}
