use ir_domain::config::DialogflowConfig;
use ir_domain::{IntentEvent, UserIdentity};

use crate::id_token::decode_unverified;
use crate::webhook::WebhookRequest;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of decoding one inbound envelope.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub identity: UserIdentity,
    pub event: IntentEvent,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("envelope has no intent")]
    MissingIntent,
    #[error("envelope has no ID token")]
    MissingToken,
    #[error("malformed ID token: {0}")]
    MalformedToken(String),
    #[error("ID token has no email claim")]
    MissingEmail,
    #[error("ID token rejected: {0}")]
    Rejected(String),
}

/// One-way decode of an inbound webhook body into an identity and event.
pub trait EnvelopeDecoder: Send + Sync {
    fn decode(&self, body: &[u8]) -> Result<Decoded, DecodeError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dialogflow implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Decoder for Dialogflow v2 webhook requests carrying an Actions on
/// Google ID token.
#[derive(Debug, Clone, Default)]
pub struct DialogflowDecoder {
    config: DialogflowConfig,
}

impl DialogflowDecoder {
    pub fn new(config: DialogflowConfig) -> Self {
        Self { config }
    }
}

impl EnvelopeDecoder for DialogflowDecoder {
    fn decode(&self, body: &[u8]) -> Result<Decoded, DecodeError> {
        let req: WebhookRequest = serde_json::from_slice(body)
            .map_err(|e| DecodeError::MalformedEnvelope(e.to_string()))?;

        let intent = req.intent_name().ok_or(DecodeError::MissingIntent)?.to_owned();
        let token = req.id_token().ok_or(DecodeError::MissingToken)?;
        let (header, claims) = decode_unverified(token)?;

        if self.config.require_verified_email && claims.email_verified != Some(true) {
            return Err(DecodeError::Rejected("email is not verified".into()));
        }
        if !self.config.allowed_audiences.is_empty() {
            let auds = claims.audiences();
            let allowed = auds
                .iter()
                .any(|a| self.config.allowed_audiences.iter().any(|x| x == a));
            if !allowed {
                return Err(DecodeError::Rejected(format!(
                    "audience {auds:?} is not allowed"
                )));
            }
        }

        let identity = claims
            .email
            .as_deref()
            .and_then(|e| UserIdentity::new(e).ok())
            .ok_or(DecodeError::MissingEmail)?;

        tracing::debug!(
            identity = %identity,
            intent = %intent,
            alg = %header.alg,
            platform_user_id = req.platform_user_id().unwrap_or(""),
            response_id = req.response_id.as_deref().unwrap_or(""),
            "decoded dialogflow webhook"
        );

        let query = req.query_result.unwrap_or_default();
        let event = IntentEvent::new(intent)
            .with_parameters(
                query
                    .parameters
                    .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            )
            .with_query_text(query.query_text)
            .with_action(query.action);

        Ok(Decoded { identity, event })
    }
}
