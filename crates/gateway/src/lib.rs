//! IntentRelay gateway: the Dialogflow webhook, the client websocket, and
//! the session registry that joins them.

pub mod api;
pub mod cli;
pub mod server;
pub mod sessions;
pub mod state;

pub use state::AppState;
