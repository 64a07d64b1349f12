//! Unverified decoding of Google ID tokens (compact JWS).
//!
//! Only the header and payload segments are decoded. The signature segment
//! is never checked, so callers must treat the claims as asserted, not proven.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Deserialize;

use crate::decoder::DecodeError;

#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenHeader {
    #[serde(default)]
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
    #[serde(default)]
    pub typ: Option<String>,
}

/// The subset of Google ID-token claims the relay cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub iss: Option<String>,
    /// A single audience string or an array of them.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl IdTokenClaims {
    pub fn audiences(&self) -> Vec<&str> {
        match &self.aud {
            Some(serde_json::Value::String(s)) => vec![s.as_str()],
            Some(serde_json::Value::Array(items)) => {
                items.iter().filter_map(|v| v.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// Split a compact token and decode its header and claims.
pub fn decode_unverified(token: &str) -> Result<(IdTokenHeader, IdTokenClaims), DecodeError> {
    let mut parts = token.trim().split('.');
    let (header, payload) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(_sig)) if parts.next().is_none() => (h, p),
        _ => {
            return Err(DecodeError::MalformedToken(
                "expected three dot-separated segments".into(),
            ))
        }
    };

    let header: IdTokenHeader = serde_json::from_slice(&segment_bytes(header)?)
        .map_err(|e| DecodeError::MalformedToken(format!("header: {e}")))?;
    let claims: IdTokenClaims = serde_json::from_slice(&segment_bytes(payload)?)
        .map_err(|e| DecodeError::MalformedToken(format!("payload: {e}")))?;

    Ok((header, claims))
}

/// Base64url-decode one segment, tolerating padding and the standard alphabet.
fn segment_bytes(segment: &str) -> Result<Vec<u8>, DecodeError> {
    let normalized: String = segment
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| DecodeError::MalformedToken(format!("base64: {e}")))
}
