//! Accept loop: one relay per IDE connection.
//!
//! Each accepted IDE socket gets its own runtime connection, symbol loader and
//! [`DebuggerProxy`]. Connections are independent; one failing never affects
//! another.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{ProxyConfig, TransportKind};
use crate::debugger::DebuggerProxy;
use crate::relay::{Connection, RelayError, ShutdownReason};
use crate::symbols::{AssemblyLoader, FileSystemSource, ManifestReader};

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listen socket could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: SocketAddr,
        /// Underlying error
        source: io::Error,
    },

    /// Accepting a connection failed
    #[error("Accept failed: {0}")]
    Accept(#[source] io::Error),

    /// WebSocket handshake with the IDE failed
    #[error("IDE handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),

    /// The runtime endpoint could not be reached
    #[error("Failed to connect to runtime at {url}: {reason}")]
    RuntimeConnect {
        /// Runtime endpoint
        url: String,
        /// What went wrong
        reason: String,
    },

    /// The relay stopped on an error
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Listening proxy server.
pub struct Server {
    config: Arc<ProxyConfig>,
    listener: TcpListener,
    shutdown: CancellationToken,
}

impl Server {
    /// Bind the IDE listen socket.
    pub async fn bind(config: ProxyConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen,
                source,
            })?;
        Ok(Self {
            config: Arc::new(config),
            listener,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Cancelling the token stops the accept loop and closes every relay.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept IDE connections until shut down.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(
            listen = %self.listener.local_addr().map_err(ServerError::Accept)?,
            runtime = %self.config.runtime_url,
            transport = %self.config.transport,
            "devtools bridge listening"
        );

        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted.map_err(ServerError::Accept)?,
            };

            let span = tracing::info_span!("connection", id = %Uuid::new_v4(), %peer);
            let config = Arc::clone(&self.config);
            let shutdown = self.shutdown.child_token();
            tokio::spawn(
                async move {
                    match serve_connection(stream, &config, shutdown).await {
                        Ok(reason) => tracing::info!(?reason, "connection closed"),
                        Err(err) => tracing::error!(error = %err, "connection failed"),
                    }
                }
                .instrument(span),
            );
        }

        tracing::info!("devtools bridge stopped");
        Ok(())
    }
}

/// Relay one IDE socket to a fresh runtime connection.
pub async fn serve_connection(
    stream: TcpStream,
    config: &ProxyConfig,
    shutdown: CancellationToken,
) -> Result<ShutdownReason, ServerError> {
    let ide = accept_ide(stream, config.transport).await?;
    let runtime = connect_runtime(config).await?;
    tracing::info!(runtime = %config.runtime_url, "connected to runtime");

    let loader = Arc::new(AssemblyLoader::new(
        Arc::new(FileSystemSource::new(config.symbol_root.clone())),
        Arc::new(ManifestReader),
    ));
    let relay = DebuggerProxy::new(loader).relay(ide, runtime);
    let handle = relay.handle();

    let run = relay.run();
    tokio::pin!(run);
    let reason = tokio::select! {
        result = &mut run => result?,
        _ = shutdown.cancelled() => {
            handle.close();
            run.await?
        }
    };
    Ok(reason)
}

async fn accept_ide(
    stream: TcpStream,
    transport: TransportKind,
) -> Result<Connection, ServerError> {
    match transport {
        TransportKind::Ndjson => Ok(Connection::ndjson(stream)),
        TransportKind::WebSocket => {
            let socket = tokio_tungstenite::accept_async(stream)
                .await
                .map_err(ServerError::Handshake)?;
            Ok(Connection::websocket(socket))
        }
    }
}

/// Open the runtime side of a relay.
pub async fn connect_runtime(config: &ProxyConfig) -> Result<Connection, ServerError> {
    let url = config.runtime_url.as_str();
    let connect_err = |reason: String| ServerError::RuntimeConnect {
        url: url.to_owned(),
        reason,
    };
    match config.transport {
        TransportKind::Ndjson => {
            let addr = url.strip_prefix("tcp://").unwrap_or(url);
            let stream = TcpStream::connect(addr)
                .await
                .map_err(|err| connect_err(err.to_string()))?;
            Ok(Connection::ndjson(stream))
        }
        TransportKind::WebSocket => {
            let (socket, _response) = tokio_tungstenite::connect_async(url)
                .await
                .map_err(|err| connect_err(err.to_string()))?;
            Ok(Connection::websocket(socket))
        }
    }
}
