//! Room Service
//!
//! Serves the room API and the signaling relay for Cortex sessions.

use common::config::{init_tracing, ObservabilityConfig};
use common::secret::ExposeSecret;
use room_service::config::{Config, StoreBackend};
use room_service::observability::metrics::init_metrics_recorder;
use room_service::registry::RoomRegistry;
use room_service::routes::{self, AppState};
use room_service::store::{MemoryRoomStore, RedisRoomStore, RoomStore};
use room_service::throttle::{run_sweeper, JoinThrottle};
use session_controller::relay::RelayHub;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str = "room_service=debug,session_controller=info,tower_http=debug";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    let observability = ObservabilityConfig::from_vars(&vars, DEFAULT_LOG_FILTER)?;
    init_tracing(&observability)?;

    info!("Starting Room Service");

    let config = Config::from_vars(&vars).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        store = ?config.store_backend,
        room_ttl_secs = config.room_ttl.as_secs(),
        join_rate_limit = config.join_rate_limit,
        join_rate_window_secs = config.join_rate_window.as_secs(),
        "Configuration loaded successfully"
    );

    let metrics_handle = if config.metrics_enabled {
        Some(init_metrics_recorder().map_err(|e| {
            error!("Failed to initialize metrics: {}", e);
            e
        })?)
    } else {
        None
    };

    let store: Arc<dyn RoomStore> = match config.store_backend {
        StoreBackend::Redis => {
            info!("Connecting to room store...");
            Arc::new(RedisRoomStore::connect(config.redis_url.expose_secret()).await?)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory room store; rooms are lost on restart");
            Arc::new(MemoryRoomStore::new())
        }
    };

    let registry = RoomRegistry::with_ring(
        store,
        config.room_ttl,
        config.room_code_max_attempts,
    );
    let throttle = Arc::new(JoinThrottle::new(
        config.join_rate_limit,
        config.join_rate_window,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&throttle), shutdown.child_token()));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let state = Arc::new(AppState {
        registry,
        throttle,
        hub: RelayHub::new(),
        config,
    });
    let app = routes::build_routes(state, metrics_handle);

    info!("Room Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Throttle sweep task ended abnormally: {}", e);
    }

    info!("Room Service shutdown complete");
    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
