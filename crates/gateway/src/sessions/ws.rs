//! WebSocket endpoint for client sessions.
//!
//! Flow:
//! 1. Client connects to `/ws`; the server immediately acknowledges.
//! 2. Client sends one `{"identity": "...", "action": "sign-in"}` message.
//! 3. The session's queue is attached to the registry under that identity
//!    and any pending intent is replayed.
//! 4. The server forwards `{"intent", "parameters"}` frames until the client
//!    goes away, the session is superseded by a newer sign-in, or (when
//!    configured) the idle timeout fires.

use std::fmt;
use std::time::Duration;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use ir_domain::config::SessionsConfig;
use ir_domain::{IntentEvent, UserIdentity};
use ir_protocol::{ServerMessage, SignInError, SignInRequest};

use crate::sessions::registry::DeliveryChannel;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET /ws: upgrade to a client session.
pub async fn client_ws(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "websocket upgrade rejected");
            return rejection.into_response();
        }
    };

    ws.on_failed_upgrade(|e| tracing::warn!(error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session state machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Why a session never reached the bound state.
#[derive(Debug, thiserror::Error)]
pub enum SignInFailure {
    #[error("no sign-in within {0:?}")]
    Timeout(Duration),
    #[error("client disconnected before sign-in")]
    Disconnected,
    #[error(transparent)]
    Rejected(#[from] SignInError),
}

/// Why a bound session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    TransportError(String),
    Superseded,
    WriteFailed(String),
    IdleTimeout,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::ClientClosed => f.write_str("client closed"),
            CloseReason::TransportError(e) => write!(f, "transport error: {e}"),
            CloseReason::Superseded => f.write_str("superseded by newer sign-in"),
            CloseReason::WriteFailed(e) => write!(f, "write failed: {e}"),
            CloseReason::IdleTimeout => f.write_str("idle timeout"),
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let settings = state.config.sessions.clone();
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Connecting → AwaitingSignIn
    if let Err(e) =
        send_server_message(&mut ws_sink, &ServerMessage::connected(), settings.write_timeout()).await
    {
        tracing::warn!(error = %e, "failed to send connection acknowledgement");
        return;
    }

    // AwaitingSignIn → Bound | Closed
    let identity = match wait_for_sign_in(&mut ws_stream, settings.sign_in_timeout()).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::info!(reason = %e, "session closed without sign-in");
            let _ = ws_sink.close().await;
            return;
        }
    };

    let session_id = Uuid::new_v4();
    let (outbound_tx, outbound_rx) = mpsc::channel::<IntentEvent>(settings.channel_capacity);
    let attached = state
        .registry
        .attach_channel(&identity, DeliveryChannel::new(session_id, outbound_tx));

    tracing::info!(
        identity = %identity,
        session_id = %session_id,
        superseded = ?attached.superseded,
        replay = ?attached.replay,
        "client signed in"
    );

    // Bound
    let reason = run_bound(&mut ws_sink, &mut ws_stream, outbound_rx, &settings).await;

    // Closed
    let detached = state.registry.detach_channel(&identity, session_id);
    let _ = ws_sink.close().await;

    tracing::info!(
        identity = %identity,
        session_id = %session_id,
        reason = %reason,
        detached,
        "client session closed"
    );
}

/// Read frames until the first application message and interpret it as the
/// sign-in request. Control frames are skipped.
pub async fn wait_for_sign_in<S>(
    stream: &mut S,
    timeout: Duration,
) -> Result<UserIdentity, SignInFailure>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let first = tokio::time::timeout(timeout, async {
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                Message::Text(text) => return Some(text),
                Message::Binary(bytes) => {
                    return Some(String::from_utf8_lossy(&bytes).into_owned());
                }
                Message::Close(_) => return None,
                Message::Ping(_) | Message::Pong(_) => {}
            }
        }
        None
    })
    .await
    .map_err(|_| SignInFailure::Timeout(timeout))?
    .ok_or(SignInFailure::Disconnected)?;

    let identity = SignInRequest::parse(&first)?.into_identity()?;
    Ok(identity)
}

/// Forward queued intents to the client while watching the transport for
/// close. Returns once the session should end.
pub async fn run_bound<K, S>(
    sink: &mut K,
    stream: &mut S,
    mut outbound_rx: mpsc::Receiver<IntentEvent>,
    settings: &SessionsConfig,
) -> CloseReason
where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let idle = settings.idle_timeout();
    let mut deadline = idle.map(|d| Instant::now() + d);

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    None | Some(Ok(Message::Close(_))) => return CloseReason::ClientClosed,
                    Some(Err(e)) => return CloseReason::TransportError(e.to_string()),
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        tracing::debug!("ignoring application frame from bound session");
                    }
                    Some(Ok(_)) => {}
                }
                deadline = idle.map(|d| Instant::now() + d);
            }
            event = outbound_rx.recv() => {
                let Some(event) = event else {
                    let frame = CloseFrame {
                        code: close_code::NORMAL,
                        reason: "superseded by a newer sign-in".into(),
                    };
                    let _ = tokio::time::timeout(
                        settings.write_timeout(),
                        sink.send(Message::Close(Some(frame))),
                    )
                    .await;
                    return CloseReason::Superseded;
                };
                if let Err(e) = send_server_message(
                    sink,
                    &ServerMessage::from(&event),
                    settings.write_timeout(),
                )
                .await
                {
                    return CloseReason::WriteFailed(e.to_string());
                }
            }
            _ = idle_elapsed(deadline) => return CloseReason::IdleTimeout,
        }
    }
}

async fn idle_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport: {0}")]
    Transport(String),
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

async fn send_server_message<K>(
    sink: &mut K,
    msg: &ServerMessage,
    timeout: Duration,
) -> Result<(), SendError>
where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
{
    let json = serde_json::to_string(msg)?;
    tokio::time::timeout(timeout, sink.send(Message::Text(json)))
        .await
        .map_err(|_| SendError::Timeout(timeout))?
        .map_err(|e| SendError::Transport(e.to_string()))
}
