//! Room service over real sockets.
//!
//! [`TestRoomServer`] serves the real room-service router on a random port.
//! [`WsRelay`] is a [`SignalRelay`] that reaches the server's WebSocket relay
//! endpoint, so sessions can be run against the deployed relay path rather
//! than the in-process hub.

use async_trait::async_trait;
use common::types::RoomCode;
use futures::{SinkExt, StreamExt};
use room_service::config::Config;
use room_service::registry::RoomRegistry;
use room_service::routes::{self, AppState};
use room_service::store::{MemoryRoomStore, RoomStore};
use room_service::throttle::JoinThrottle;
use session_controller::errors::SessionError;
use session_controller::relay::{RelayHub, RelayLink, SignalRelay};
use session_controller::signaling::SignalMessage;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Test harness for spawning the room service in tests.
///
/// # Example
/// ```rust,ignore
/// let server = TestRoomServer::spawn().await?;
/// let relay: Arc<dyn SignalRelay> = Arc::new(server.relay());
/// ```
pub struct TestRoomServer {
    addr: SocketAddr,
    hub: Arc<RelayHub>,
    handle: JoinHandle<()>,
}

impl TestRoomServer {
    /// Spawn with an in-memory store and default configuration.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_store(Arc::new(MemoryRoomStore::new())).await
    }

    /// Spawn over a caller-supplied store.
    pub async fn spawn_with_store(store: Arc<dyn RoomStore>) -> Result<Self, anyhow::Error> {
        let vars = HashMap::from([("ROOM_STORE".to_string(), "memory".to_string())]);
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to build test config: {}", e))?;

        let hub = RelayHub::new();
        let state = Arc::new(AppState {
            registry: RoomRegistry::with_ring(
                store,
                config.room_ttl,
                config.room_code_max_attempts,
            ),
            throttle: Arc::new(JoinThrottle::new(
                config.join_rate_limit,
                config.join_rate_window,
            )),
            hub: Arc::clone(&hub),
            config,
        });

        // Standalone recorder, never installed globally, so parallel tests
        // do not fight over the global slot
        let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();

        let app = routes::build_routes(state, Some(metrics_handle));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            hub,
            handle,
        })
    }

    /// Base URL of the HTTP API.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket relay URL for `room`.
    pub fn ws_url(&self, room: &str) -> String {
        format!("ws://{}/ws/rooms/{}", self.addr, room)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The hub behind the relay endpoint.
    pub fn hub(&self) -> &Arc<RelayHub> {
        &self.hub
    }

    /// A relay client for this server.
    pub fn relay(&self) -> WsRelay {
        WsRelay { addr: self.addr }
    }
}

impl Drop for TestRoomServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// [`SignalRelay`] over the room service's WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsRelay {
    addr: SocketAddr,
}

impl WsRelay {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl SignalRelay for WsRelay {
    async fn attach(&self, scope: &RoomCode) -> Result<Box<dyn RelayLink>, SessionError> {
        let url = format!("ws://{}/ws/rooms/{}", self.addr, scope);
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| SessionError::Relay(format!("websocket connect failed: {e}")))?;
        Ok(Box::new(WsRelayLink { socket }))
    }
}

struct WsRelayLink {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RelayLink for WsRelayLink {
    async fn publish(&mut self, message: &SignalMessage) -> Result<(), SessionError> {
        let payload = message.encode()?;
        self.socket
            .send(Message::Text(payload))
            .await
            .map_err(|e| SessionError::Relay(format!("websocket send failed: {e}")))
    }

    async fn recv(&mut self) -> Option<SignalMessage> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => {
                    if let Ok(message) = SignalMessage::decode(&text) {
                        return Some(message);
                    }
                }
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }
}
