use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// GET /health: liveness probe with registry counters.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.registry.stats();
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "identities": stats.identities,
        "bound_sessions": stats.bound_sessions,
        "pending_intents": stats.pending_intents,
    }))
}
