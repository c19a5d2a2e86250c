//! WebSocket Proof Server
//!
//! Async WebSocket server for browser dashboard connections.
//! Handles request dispatch to the proof engine and live progress streaming.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::engine::ProofEngine;
use crate::network::protocol::{
    ClientRequest, ErrorCode, ProofEntry, ServerError, ServerResponse,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle connections past this age are dropped by the cleanup loop.
    pub idle_timeout: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Proof server errors.
#[derive(Debug, thiserror::Error)]
pub enum ProofServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,
}

/// Connected client state.
struct ConnectedClient {
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
    /// Message sender (for direct messaging to client).
    sender: mpsc::Sender<ServerResponse>,
    /// Tells the connection task to close the socket.
    close_tx: mpsc::Sender<()>,
}

/// The proof server.
pub struct ProofServer {
    /// Server configuration.
    config: ServerConfig,
    /// The lifecycle engine behind every request.
    engine: Arc<ProofEngine>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl ProofServer {
    /// Create a new proof server.
    pub fn new(config: ServerConfig, engine: Arc<ProofEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            engine,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), ProofServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Proof server listening on {}", self.config.bind_addr);

        let cleanup_clients = self.clients.clone();
        let idle_timeout = self.config.idle_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let engine = self.engine.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerResponse>(64);
            let (close_tx, mut close_rx) = mpsc::channel::<()>(1);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                    sender: msg_tx.clone(),
                    close_tx,
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_frame() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize response: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let request = match ClientRequest::from_json(&text) {
                                    Ok(r) => r,
                                    Err(e) => {
                                        debug!("Invalid request from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerResponse::Error(
                                            ServerError {
                                                code: ErrorCode::InvalidRequest,
                                                message: "Invalid request format".to_string(),
                                            }
                                        )).await;
                                        continue;
                                    }
                                };

                                // Update activity
                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_request(addr, request, &engine, &msg_tx).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(ServerResponse::Pong {
                                    timestamp: 0,
                                    server_time: server_time_millis(),
                                }).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = close_rx.recv() => {
                        debug!("Client {} closed as idle", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerResponse::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();

            {
                let mut clients = clients.write().await;
                clients.remove(&addr);
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client request.
    async fn handle_request(
        addr: SocketAddr,
        request: ClientRequest,
        engine: &Arc<ProofEngine>,
        sender: &mpsc::Sender<ServerResponse>,
    ) {
        match request {
            ClientRequest::Reserve { channel } => {
                let response = match engine.reserve(&channel).await {
                    Ok(reservation) => ServerResponse::Reserved(reservation),
                    Err(e) => ServerResponse::from_ledger_error(&e),
                };
                let _ = sender.send(response).await;
            }
            ClientRequest::Submit(req) => {
                let response = match engine
                    .submit(
                        &req.channel,
                        &req.submitter,
                        req.sequence_number,
                        req.sub_number,
                        &req.artifact_bytes,
                    )
                    .await
                {
                    Ok(receipt) => ServerResponse::Submitted(receipt),
                    Err(e) => ServerResponse::from_ledger_error(&e),
                };
                let _ = sender.send(response).await;
            }
            ClientRequest::Adjudicate(req) => {
                let response = match engine
                    .adjudicate(&req.channel, &req.winning_key, req.sequence_number, &req.verifier)
                    .await
                {
                    Ok(outcome) => ServerResponse::Adjudicated(outcome),
                    Err(e) => ServerResponse::from_ledger_error(&e),
                };
                let _ = sender.send(response).await;
            }
            ClientRequest::ListProofs { channel, collection } => {
                let response = match engine.list_proofs(&channel, collection).await {
                    Ok(entries) => ServerResponse::Proofs {
                        channel,
                        collection,
                        entries: entries
                            .into_iter()
                            .map(|(key, record)| ProofEntry { key, record })
                            .collect(),
                    },
                    Err(e) => ServerResponse::from_ledger_error(&e),
                };
                let _ = sender.send(response).await;
            }
            ClientRequest::GetProof { channel, collection, key } => {
                let response = match engine.get_proof(&channel, collection, &key).await {
                    Ok(record) => ServerResponse::Proof(ProofEntry { key, record }),
                    Err(e) => ServerResponse::from_ledger_error(&e),
                };
                let _ = sender.send(response).await;
            }
            ClientRequest::Generate(req) => {
                match engine
                    .generate(&req.channel, req.include_proof, req.transaction)
                    .await
                {
                    Ok(mut rx) => {
                        debug!("Client {} started generation for '{}'", addr, req.channel);
                        let progress_tx = sender.clone();
                        // Forward the progress stream; a failed send means
                        // the client is gone, and dropping `rx` cancels the
                        // run between stages.
                        tokio::spawn(async move {
                            while let Some(event) = rx.recv().await {
                                let terminal = event.is_terminal();
                                if progress_tx
                                    .send(ServerResponse::Progress(event))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                                if terminal {
                                    break;
                                }
                            }
                        });
                    }
                    Err(e) => {
                        let _ = sender.send(ServerResponse::from_ledger_error(&e)).await;
                    }
                }
            }
            ClientRequest::Ping { timestamp } => {
                let _ = sender.send(ServerResponse::Pong {
                    timestamp,
                    server_time: server_time_millis(),
                }).await;
            }
        }
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            Self::close_idle_clients(&clients, idle_timeout, Instant::now()).await;
        }
    }

    /// One sweep: tell every client idle past the deadline to disconnect.
    ///
    /// The connection task closes the socket and removes its own map entry
    /// when it receives the close signal.
    async fn close_idle_clients(
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        idle_timeout: Duration,
        now: Instant,
    ) {
        type IdleEntry = (SocketAddr, mpsc::Sender<ServerResponse>, mpsc::Sender<()>, Instant);
        let idle: Vec<IdleEntry> = {
            let clients = clients.read().await;
            clients
                .iter()
                .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                .map(|(addr, c)| (*addr, c.sender.clone(), c.close_tx.clone(), c.connected_at))
                .collect()
        };

        for (addr, sender, close_tx, connected_at) in idle {
            info!(
                "Closing idle client {} (connected for {:?})",
                addr,
                now.duration_since(connected_at)
            );
            let _ = sender
                .send(ServerResponse::Shutdown {
                    reason: "idle timeout".to_string(),
                })
                .await;
            let _ = close_tx.send(()).await;
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

fn server_time_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    fn test_engine(dir: &tempfile::TempDir) -> Arc<ProofEngine> {
        Arc::new(ProofEngine::new(EngineConfig {
            data_dir: dir.path().join("data"),
            prover_binary: dir.path().join("prover"),
            workdir_root: None,
        }))
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = ProofServer::new(config, test_engine(&dir));

        assert_eq!(server.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_idle_clients_are_signaled_to_close() {
        let clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>> =
            Arc::new(RwLock::new(BTreeMap::new()));
        let (msg_tx, mut msg_rx) = mpsc::channel(8);
        let (close_tx, mut close_rx) = mpsc::channel(1);
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let connected = Instant::now();
        clients.write().await.insert(
            addr,
            ConnectedClient {
                connected_at: connected,
                last_activity: connected,
                sender: msg_tx,
                close_tx,
            },
        );

        // Within the deadline: untouched.
        ProofServer::close_idle_clients(&clients, Duration::from_secs(300), connected).await;
        assert!(close_rx.try_recv().is_err());

        // Past the deadline: shutdown frame, then the close signal.
        let later = connected + Duration::from_secs(301);
        ProofServer::close_idle_clients(&clients, Duration::from_secs(300), later).await;
        assert!(matches!(
            msg_rx.recv().await,
            Some(ServerResponse::Shutdown { .. })
        ));
        assert!(close_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = ProofServer::new(config, test_engine(&dir));
        server.shutdown();
        // Should not panic
    }
}
