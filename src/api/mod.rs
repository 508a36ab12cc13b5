//! HTTP API for metric ingestion and lookup
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Shared storage** behind `Arc<dyn MetricStorage>`
//! - **Gzip** request decompression and response compression
//!
//! ## Endpoints
//!
//! - `POST /update/:kind/:id/:value` - Store one sample from path segments
//! - `POST /update` - Store one JSON sample, answers with the current value
//! - `POST /updates` - Store a JSON array of samples
//! - `GET /value/:kind/:id` - Current value as a JSON number
//! - `POST /value` - Current value as a JSON sample
//! - `GET /` - Dump of every record
//! - `GET /ping` - Storage health

pub mod error;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "localhost:8080" or "0.0.0.0:0")
    pub bind_addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "localhost:8080".to_string(),
        }
    }
}

/// Build the router with all routes and middleware
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(routes::dump::dump))
        .route("/ping", get(routes::health::ping))
        .route("/update", post(routes::update::update_json))
        .route("/updates", post(routes::update::update_batch))
        .route(
            "/update/:kind/:id/:value",
            post(routes::update::update_path),
        )
        .route("/value", post(routes::value::value_json))
        .route("/value/:kind/:id", get(routes::value::value_path))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestDecompressionLayer::new())
                .layer(CompressionLayer::new()),
        )
}

/// A running API server
pub struct ApiServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl ApiServer {
    /// Address the server is listening on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting connections and drain in-flight requests
    ///
    /// Requests still running after `grace` are cut off. Returns `true` if
    /// the drain finished in time.
    pub async fn shutdown(self, grace: Duration) -> bool {
        let Self {
            mut handle,
            shutdown,
            ..
        } = self;

        let _ = shutdown.send(());

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(_) => {
                info!("API server stopped");
                true
            }
            Err(_) => {
                warn!("API server did not drain within {grace:?}, forcing stop");
                handle.abort();
                false
            }
        }
    }
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<ApiServer> {
    info!("starting API server on {}", config.bind_addr);

    let app = build_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    // Spawn server in background
    let handle = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        if let Err(e) = server.await {
            error!("API server error: {}", e);
        }
    });

    Ok(ApiServer {
        addr,
        handle,
        shutdown: shutdown_tx,
    })
}
