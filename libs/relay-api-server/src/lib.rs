mod error;
mod http;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use telemetry_store::TelemetryStore;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    store: Arc<TelemetryStore>,
    ws_interval: Duration,
    /// Отмена останавливает и accept-цикл, и уже открытые `/ws` соединения.
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(store: Arc<TelemetryStore>, ws_interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            store,
            ws_interval,
            shutdown,
        }
    }
}

/// Все маршруты relay. Состояния кроме store нет.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/data", get(http::handle_data))
        .route("/status", get(http::handle_status))
        .route("/health", get(http::handle_health))
        .route("/ws", get(ws::handle_ws))
        .with_state(state)
}

/// Bind the API listener on `host:port`.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, ApiError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::Bind { addr, source: e })
}

/// Serve on an already bound listener until the state's token is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), ApiError> {
    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ApiError::Serve)
}
