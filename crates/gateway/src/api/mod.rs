pub mod dialogflow;
pub mod health;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the relay's routes.
///
/// - `POST /dialogflow`: fulfillment webhook (intent ingestion)
/// - `GET  /ws`: client session websocket
/// - `GET  /health`: liveness + registry counters
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dialogflow", post(dialogflow::dialogflow_webhook))
        .route("/ws", get(crate::sessions::ws::client_ws))
        .route("/health", get(health::health))
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
