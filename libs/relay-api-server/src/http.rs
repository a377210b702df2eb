use axum::extract::State;
use axum::response::IntoResponse;

use super::AppState;

// ═══════════════════════════════════════════════════════════════
//  REST: GET /data
// ═══════════════════════════════════════════════════════════════

/// Snapshot всех машин: `{"<car>": packet, ..., "error": "..."}`.
///
/// Lock store отпускается до сериализации.
pub(crate) async fn handle_data(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot().await;
    axum::Json(snapshot)
}

// ═══════════════════════════════════════════════════════════════
//  REST: GET /status
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_status(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.store.status().await)
}

// ═══════════════════════════════════════════════════════════════
//  REST: GET /health
// ═══════════════════════════════════════════════════════════════

pub(crate) async fn handle_health() -> impl IntoResponse {
    "OK"
}
