mod dialogflow;
mod observability;
mod server;
mod sessions;

pub use dialogflow::*;
pub use observability::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub dialogflow: DialogflowConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.max_concurrent_requests == 0 {
            errors.push(ConfigError::error(
                "server.max_concurrent_requests",
                "must be greater than 0",
            ));
        }
        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError::warning(
                "server.cors.allowed_origins",
                "wildcard \"*\" allows all origins (not recommended for production)",
            ));
        }

        if self.sessions.channel_capacity == 0 {
            errors.push(ConfigError::error(
                "sessions.channel_capacity",
                "channel capacity must be greater than 0",
            ));
        }
        if self.sessions.sign_in_timeout_secs == 0 {
            errors.push(ConfigError::error(
                "sessions.sign_in_timeout_secs",
                "sign-in timeout must be greater than 0",
            ));
        }
        if self.sessions.write_timeout_secs == 0 {
            errors.push(ConfigError::error(
                "sessions.write_timeout_secs",
                "write timeout must be greater than 0",
            ));
        }
        if self.sessions.idle_timeout_secs == Some(0) {
            errors.push(ConfigError::error(
                "sessions.idle_timeout_secs",
                "idle timeout must be greater than 0 (omit it to disable)",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample rate must be within [0.0, 1.0]",
            ));
        }

        // The token is never signature-checked; make that visible.
        if !self.dialogflow.require_verified_email && self.dialogflow.allowed_audiences.is_empty() {
            errors.push(ConfigError::warning(
                "dialogflow",
                "no ID-token claim checks configured; any well-formed token is trusted",
            ));
        }

        errors
    }

    /// `true` when [`validate`](Self::validate) reports no errors (warnings allowed).
    pub fn is_valid(&self) -> bool {
        self.validate()
            .iter()
            .all(|e| e.severity != ConfigSeverity::Error)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.is_valid());
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9090");
    }

    #[test]
    fn default_warns_about_claim_checks() {
        let issues = Config::default().validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "dialogflow" && e.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn zero_capacity_is_an_error() {
        let mut cfg = Config::default();
        cfg.sessions.channel_capacity = 0;
        let issues = cfg.validate();
        assert!(issues.iter().any(|e| e.field == "sessions.channel_capacity"));
        assert!(!cfg.is_valid());
    }

    #[test]
    fn out_of_range_sample_rate_is_an_error() {
        let mut cfg = Config::default();
        cfg.observability.sample_rate = 1.5;
        assert!(!cfg.is_valid());
    }

    #[test]
    fn full_file_parses() {
        let raw = r#"
            [server]
            port = 8443

            [sessions]
            channel_capacity = 4
            replay_on_attach = false

            [dialogflow]
            require_verified_email = true
        "#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert_eq!(cfg.server.port, 8443);
        assert_eq!(cfg.sessions.channel_capacity, 4);
        assert!(!cfg.sessions.replay_on_attach);
        assert!(cfg.dialogflow.require_verified_email);
        assert!(cfg.is_valid());
    }

    #[test]
    fn display_tags_severity() {
        let e = ConfigError::error("server.port", "bad");
        assert_eq!(e.to_string(), "[ERROR] server.port: bad");
    }
}
