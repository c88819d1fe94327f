use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_core::session::{conversation_from_connect_param, CONNECT_PARAMS};
use parley_core::ConversationId;
use parley_settings::ServerSettings;
use parley_store::MessageStore;

use crate::broadcast::BroadcastHub;
use crate::client::ClientRegistry;
use crate::connection::run_connection;
use crate::gateway::PersistenceGateway;
use crate::handler::ConnectionHandler;

/// How long `ServerHandle::shutdown` waits before aborting.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
    pub persist_timeout: Option<Duration>,
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerSettings::default())
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_send_queue: settings.max_send_queue,
            persist_timeout: (settings.persist_timeout_ms > 0)
                .then(|| Duration::from_millis(settings.persist_timeout_ms)),
            broadcast_capacity: settings.broadcast_capacity,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: PersistenceGateway,
    pub hub: Arc<BroadcastHub>,
    pub clients: Arc<ClientRegistry>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: &ServerConfig, store: Arc<dyn MessageStore>) -> Self {
        Self {
            gateway: PersistenceGateway::new(store).with_timeout(config.persist_timeout),
            hub: Arc::new(BroadcastHub::new(config.broadcast_capacity)),
            clients: Arc::new(ClientRegistry::new(config.max_send_queue)),
            started_at: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind, serve in the background, and return a handle to stop it.
pub async fn start(
    config: ServerConfig,
    store: Arc<dyn MessageStore>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(&config, store);
    let hub = Arc::clone(&state.hub);
    let clients = Arc::clone(&state.clients);
    let router = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    info!(addr = %local_addr, "parley server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        hub,
        clients,
        shutdown_tx: Some(shutdown_tx),
        server,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running.
pub struct ServerHandle {
    pub addr: SocketAddr,
    hub: Arc<BroadcastHub>,
    clients: Arc<ClientRegistry>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The fan-out hub, for producers outside any connection.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    pub fn connection_count(&self) -> usize {
        self.clients.count()
    }

    /// Stop accepting connections and wait for in-flight requests, up to
    /// `SHUTDOWN_GRACE`. Whatever is left after that is aborted.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.server).await.is_err() {
            warn!("graceful shutdown timed out, aborting open connections");
            self.server.abort();
            let _ = (&mut self.server).await;
        }
        info!("parley server stopped");
    }
}

/// WebSocket upgrade handler. A conversation named in the query string
/// seeds the session.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let seed = connect_seed(&params);
    ws.on_upgrade(move |socket| handle_socket(socket, state, seed))
}

fn connect_seed(params: &HashMap<String, String>) -> Option<ConversationId> {
    let raw = CONNECT_PARAMS
        .iter()
        .filter_map(|key| params.get(*key))
        .find(|value| !value.is_empty());
    conversation_from_connect_param(raw.map(String::as_str))
}

async fn handle_socket(socket: WebSocket, state: AppState, seed: Option<ConversationId>) {
    let (client, outbound_rx) = state.clients.register();
    let handler = ConnectionHandler::new(
        client.id.clone(),
        seed,
        state.gateway.clone(),
        Arc::clone(&state.hub),
    );

    run_connection(
        socket,
        Arc::clone(&client),
        outbound_rx,
        handler,
        Arc::clone(&state.hub),
    )
    .await;

    state.clients.unregister(&client.id);
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    connections: usize,
    conversations: usize,
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        uptime_secs: state.started_at.elapsed().as_secs(),
        connections: state.clients.count(),
        conversations: state.hub.conversation_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_store::{Database, MessageRepo};

    fn store() -> Arc<dyn MessageStore> {
        Arc::new(MessageRepo::new(Database::in_memory().unwrap()))
    }

    fn local() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn config_from_settings() {
        let settings = ServerSettings {
            persist_timeout_ms: 0,
            ..ServerSettings::default()
        };
        let config = ServerConfig::from(&settings);
        assert_eq!(config.port, 9091);
        assert_eq!(config.max_send_queue, 256);
        assert!(config.persist_timeout.is_none());

        assert_eq!(
            ServerConfig::default().persist_timeout,
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn connect_seed_checks_params_in_order() {
        let uuid = "6f9619ff-8b86-d011-b42d-00c04fc964ff";

        let params = HashMap::from([("chatId".to_string(), uuid.to_string())]);
        assert_eq!(connect_seed(&params).unwrap().as_str(), uuid);

        let params = HashMap::from([
            ("chat".to_string(), String::new()),
            ("chat_id".to_string(), uuid.to_string()),
        ]);
        assert_eq!(connect_seed(&params).unwrap().as_str(), uuid);

        assert!(connect_seed(&HashMap::new()).is_none());
    }

    #[test]
    fn connect_seed_replaces_non_uuid() {
        let params = HashMap::from([("chat".to_string(), "not-a-uuid".to_string())]);
        let seed = connect_seed(&params).unwrap();
        assert_ne!(seed.as_str(), "not-a-uuid");
        assert!(ConversationId::parse_uuid(seed.as_str()).is_some());
    }

    #[test]
    fn build_router_creates_routes() {
        let state = AppState::new(&local(), store());
        let _router = build_router(state);
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let handle = start(local(), store()).await.unwrap();
        assert!(handle.port() > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port());
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["conversations"], 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_listener() {
        let handle = start(local(), store()).await.unwrap();
        let url = format!("http://127.0.0.1:{}/health", handle.port());
        handle.shutdown().await;

        assert!(reqwest::get(&url).await.is_err());
    }
}
