//! `YooServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use yoo_auth::{TokenIssuer, authenticate};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::handler::ConnectionHandler;
use crate::websocket::producer::MessageProducer;
use crate::websocket::upgrade::{refresh_token, yoo_chat};

/// Every route the server mounts, as `(method, path)`.
pub const ROUTES: &[(&str, &str)] = &[
    ("GET", "/yoo-chat"),
    ("POST", "/refreshToken"),
    ("GET", "/health"),
    ("GET", "/metrics"),
];

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session runner, pool, and registry.
    pub connections: Arc<ConnectionHandler>,
    /// Token signer and verifier.
    pub issuer: Arc<TokenIssuer>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
}

/// The yoo-chat server.
pub struct YooServer {
    config: ServerConfig,
    connections: Arc<ConnectionHandler>,
    issuer: Arc<TokenIssuer>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl YooServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, issuer: TokenIssuer, producer: Arc<dyn MessageProducer>) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let connections = Arc::new(ConnectionHandler::new(
            config.connection.clone(),
            producer,
            Arc::clone(&shutdown),
        ));
        Self {
            config,
            connections,
            issuer: Arc::new(issuer),
            shutdown,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            connections: Arc::clone(&self.connections),
            issuer: Arc::clone(&self.issuer),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            max_message_size: self.config.max_message_size,
        };

        let authenticated = Router::new()
            .route("/yoo-chat", get(yoo_chat))
            .route("/refreshToken", post(refresh_token))
            .route_layer(from_fn_with_state(Arc::clone(&self.issuer), authenticate));

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .merge(authenticated)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address and the serve task. The task ends once the
    /// shutdown token is cancelled and in-flight requests drain.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_address();
        let listener = TcpListener::bind(&addr).await.map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        for (method, path) in ROUTES {
            info!(method, path, "registered endpoint");
        }
        info!(%local_addr, "yoo-chat server listening");

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(err) = result {
                error!(error = %err, "server error");
            }
            info!("yoo-chat server stopped");
        });

        Ok((local_addr, handle))
    }

    /// Get the connection handler.
    pub fn connections(&self) -> &Arc<ConnectionHandler> {
        &self.connections
    }

    /// Get the token issuer.
    pub fn issuer(&self) -> &Arc<TokenIssuer> {
        &self.issuer
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.connections.registry().len();
    let pooled = state.connections.pool().allocated();
    Json(health::health_check(state.start_time, connections, pooled))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
