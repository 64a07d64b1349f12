use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dialogflow webhook
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Claim checks applied to the ID token embedded in webhook requests.
///
/// These are claim checks only. The token signature is never verified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogflowConfig {
    /// Reject tokens whose `email_verified` claim is not `true`.
    #[serde(default)]
    pub require_verified_email: bool,

    /// Accepted `aud` values. Empty accepts any audience.
    #[serde(default)]
    pub allowed_audiences: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive() {
        let cfg: DialogflowConfig = toml::from_str("").unwrap();
        assert!(!cfg.require_verified_email);
        assert!(cfg.allowed_audiences.is_empty());
    }

    #[test]
    fn parses_audiences() {
        let cfg: DialogflowConfig = toml::from_str(
            r#"
            require_verified_email = true
            allowed_audiences = ["my-client-id.apps.googleusercontent.com"]
            "#,
        )
        .unwrap();
        assert!(cfg.require_verified_email);
        assert_eq!(cfg.allowed_audiences.len(), 1);
    }
}
