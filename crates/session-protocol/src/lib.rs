//! Client session protocol: the JSON messages exchanged over `/ws`.
//!
//! Flow:
//! 1. Server sends [`ServerMessage::Ack`] right after the upgrade.
//! 2. Client sends one [`SignInRequest`].
//! 3. Server pushes zero or more [`ServerMessage::Intent`] frames.

use ir_domain::{IntentEvent, UserIdentity};
use serde::{Deserialize, Serialize};

/// Action string a client must send to bind its session.
pub const SIGN_IN_ACTION: &str = "sign-in";

/// Spelling used by older clients; accepted for compatibility.
pub const LEGACY_SIGN_IN_ACTION: &str = "Sign In";

/// Text of the acknowledgement sent once the websocket is up.
pub const CONNECTED_MESSAGE: &str = "Connection successfully established";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client → server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The single sign-in message a client sends after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInRequest {
    #[serde(default, alias = "email")]
    pub identity: String,
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignInError {
    #[error("malformed sign-in message: {0}")]
    Malformed(String),
    #[error("unrecognized action {0:?}")]
    UnknownAction(String),
    #[error("identity must not be empty")]
    EmptyIdentity,
}

impl SignInRequest {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            action: SIGN_IN_ACTION.into(),
        }
    }

    /// Parse a raw text frame into a sign-in request.
    pub fn parse(text: &str) -> Result<Self, SignInError> {
        serde_json::from_str(text).map_err(|e| SignInError::Malformed(e.to_string()))
    }

    pub fn is_sign_in(&self) -> bool {
        self.action == SIGN_IN_ACTION || self.action == LEGACY_SIGN_IN_ACTION
    }

    /// Validate the request and extract the identity to bind.
    pub fn into_identity(self) -> Result<UserIdentity, SignInError> {
        if !self.is_sign_in() {
            return Err(SignInError::UnknownAction(self.action));
        }
        UserIdentity::new(&self.identity).map_err(|_| SignInError::EmptyIdentity)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server → client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Sent once after the upgrade completes.
    Ack { message: String },
    /// A forwarded intent.
    Intent {
        intent: String,
        parameters: serde_json::Value,
    },
}

impl ServerMessage {
    pub fn connected() -> Self {
        ServerMessage::Ack {
            message: CONNECTED_MESSAGE.into(),
        }
    }
}

impl From<&IntentEvent> for ServerMessage {
    fn from(ev: &IntentEvent) -> Self {
        ServerMessage::Intent {
            intent: ev.intent.clone(),
            parameters: ev.parameters.clone(),
        }
    }
}
