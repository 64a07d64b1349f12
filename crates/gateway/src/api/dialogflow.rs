//! Dialogflow fulfillment webhook, `POST /dialogflow`.
//!
//! Decodes the webhook envelope into an identity and intent, records it in
//! the session registry, and acknowledges immediately. Whether a live client
//! received the intent is never reported back to Dialogflow.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::state::AppState;

use super::api_error;

pub async fn dialogflow_webhook(State(state): State<AppState>, body: Bytes) -> Response {
    let decoded = match state.decoder.decode(&body) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, body_len = body.len(), "rejected dialogflow webhook");
            return api_error(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    let intent = decoded.event.intent.clone();
    let outcome = state.registry.upsert_intent(&decoded.identity, decoded.event);

    tracing::info!(
        identity = %decoded.identity,
        intent = %intent,
        outcome = ?outcome,
        "intent received"
    );

    // Empty fulfillment: Dialogflow falls back to the agent's static response.
    (StatusCode::OK, Json(serde_json::json!({}))).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use axum::Router;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use ir_domain::config::Config;
    use ir_domain::UserIdentity;
    use tower::ServiceExt;

    use super::*;

    fn app() -> (Router, AppState) {
        let state = AppState::new(Arc::new(Config::default()));
        (crate::api::router().with_state(state.clone()), state)
    }

    fn token_for(email: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(serde_json::json!({ "email": email }).to_string());
        format!("{header}.{claims}.sig")
    }

    fn post(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/dialogflow")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .expect("request")
    }

    async fn status_and_json(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(req).await.expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn valid_envelope_is_recorded() {
        let (app, state) = app();
        let body = serde_json::json!({
            "queryResult": {
                "queryText": "hi",
                "parameters": {"name": "Ada"},
                "intent": {"displayName": "greet"}
            },
            "originalDetectIntentRequest": {
                "payload": {"user": {"idToken": token_for("a@x.com")}}
            }
        });

        let (status, json) = status_and_json(app, post(body.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({}));

        let pending = state
            .registry
            .pending_intent(&UserIdentity::new("a@x.com").unwrap())
            .expect("pending intent");
        assert_eq!(pending.intent, "greet");
        assert_eq!(pending.parameters["name"], "Ada");
    }

    #[tokio::test]
    async fn malformed_envelope_is_bad_request() {
        let (app, state) = app();
        let (status, json) = status_and_json(app, post("{\"queryResult\": ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("malformed envelope"));
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn envelope_without_token_is_bad_request() {
        let (app, state) = app();
        let body = serde_json::json!({"queryResult": {"intent": {"displayName": "greet"}}});
        let (status, _) = status_and_json(app, post(body.to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.registry.is_empty());
    }
}
