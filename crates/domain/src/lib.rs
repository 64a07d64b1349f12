//! Shared domain types for IntentRelay: identities, intent events,
//! configuration, and the common error type.

pub mod config;
pub mod error;
pub mod intent;

pub use error::{Error, Result};
pub use intent::{IntentEvent, UserIdentity};
