//! Identity keys and intent events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UserIdentity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The key a user is known by on both sides of the bridge (their email).
///
/// Always non-empty; surrounding whitespace is trimmed on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct UserIdentity(String);

impl UserIdentity {
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::Identity("identity must not be empty".into()));
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for UserIdentity {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        UserIdentity::new(raw).map_err(serde::de::Error::custom)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// IntentEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single matched intent as reported by the conversational backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentEvent {
    /// Intent display name (e.g. `"greet"`). Used as the routing payload.
    pub intent: String,
    /// Extracted parameters; an arbitrary JSON object, possibly nested.
    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,
    /// What the user actually said. Informational only.
    #[serde(default)]
    pub query_text: String,
    /// Backend action name, if the intent declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl IntentEvent {
    /// Build an event stamped with the current time and no parameters.
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            parameters: empty_parameters(),
            query_text: String::new(),
            action: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_query_text(mut self, query_text: impl Into<String>) -> Self {
        self.query_text = query_text.into();
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        let action = action.into();
        self.action = (!action.is_empty()).then_some(action);
        self
    }
}

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
