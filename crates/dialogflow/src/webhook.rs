//! Serde model of the parts of a Dialogflow v2 `WebhookRequest` we read.
//!
//! Every field is optional and unknown fields are ignored, mirroring the
//! lenient protobuf-JSON decoding Dialogflow clients expect.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default)]
    pub response_id: Option<String>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub query_result: Option<QueryResult>,
    #[serde(default)]
    pub original_detect_intent_request: Option<OriginalDetectIntentRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub query_text: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
    #[serde(default)]
    pub intent: Option<Intent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalDetectIntentRequest {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

impl WebhookRequest {
    /// Display name of the matched intent, if any.
    pub fn intent_name(&self) -> Option<&str> {
        self.query_result
            .as_ref()
            .and_then(|q| q.intent.as_ref())
            .map(|i| i.display_name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// `originalDetectIntentRequest.payload.user.idToken`.
    pub fn id_token(&self) -> Option<&str> {
        self.original_detect_intent_request
            .as_ref()?
            .payload
            .as_ref()?
            .get("user")?
            .get("idToken")?
            .as_str()
            .filter(|t| !t.is_empty())
    }

    /// `originalDetectIntentRequest.payload.user.userId`, logged for tracing
    /// only; routing always uses the token's email claim.
    pub fn platform_user_id(&self) -> Option<&str> {
        self.original_detect_intent_request
            .as_ref()?
            .payload
            .as_ref()?
            .get("user")?
            .get("userId")?
            .as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_nested_fields() {
        let body = json!({
            "responseId": "r-1",
            "queryResult": {
                "queryText": "turn on the lights",
                "action": "lights.on",
                "parameters": {"room": "kitchen"},
                "intent": {"name": "projects/p/agent/intents/1", "displayName": "lights"},
                "languageCode": "en"
            },
            "originalDetectIntentRequest": {
                "source": "google",
                "payload": {"user": {"idToken": "a.b.c", "userId": "u-1"}}
            }
        });
        let req: WebhookRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.intent_name(), Some("lights"));
        assert_eq!(req.id_token(), Some("a.b.c"));
        assert_eq!(req.platform_user_id(), Some("u-1"));
        assert_eq!(req.query_result.unwrap().query_text, "turn on the lights");
    }

    #[test]
    fn missing_sections_are_none() {
        let req: WebhookRequest = serde_json::from_str("{}").unwrap();
        assert!(req.intent_name().is_none());
        assert!(req.id_token().is_none());
    }
}
