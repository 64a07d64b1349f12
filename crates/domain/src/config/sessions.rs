use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client sessions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tuning for websocket client sessions and their delivery channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Capacity of each session's outbound intent queue. A push into a
    /// full queue is dropped and logged, never awaited.
    #[serde(default = "d_32")]
    pub channel_capacity: usize,

    /// How long a freshly connected client has to send its sign-in message.
    #[serde(default = "d_10")]
    pub sign_in_timeout_secs: u64,

    /// Upper bound on a single websocket write before the session is
    /// considered dead.
    #[serde(default = "d_5")]
    pub write_timeout_secs: u64,

    /// Close a bound session after this long without any inbound frame.
    /// `None` disables the idle check.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,

    /// Push the latest pending intent to a session as soon as it signs in.
    #[serde(default = "d_true")]
    pub replay_on_attach: bool,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
            sign_in_timeout_secs: 10,
            write_timeout_secs: 5,
            idle_timeout_secs: None,
            replay_on_attach: true,
        }
    }
}

impl SessionsConfig {
    pub fn sign_in_timeout(&self) -> Duration {
        Duration::from_secs(self.sign_in_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }
}

fn d_32() -> usize {
    32
}
fn d_10() -> u64 {
    10
}
fn d_5() -> u64 {
    5
}
fn d_true() -> bool {
    true
}
