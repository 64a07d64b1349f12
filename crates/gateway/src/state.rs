use std::sync::Arc;

use ir_dialogflow::{DialogflowDecoder, EnvelopeDecoder};
use ir_domain::config::Config;

use crate::sessions::SessionRegistry;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Identity → pending intent / live session channel.
    pub registry: Arc<SessionRegistry>,
    /// Turns webhook bodies into `(identity, intent)` pairs.
    pub decoder: Arc<dyn EnvelopeDecoder>,
}

impl AppState {
    /// Build state with an empty registry and the Dialogflow decoder.
    pub fn new(config: Arc<Config>) -> Self {
        let decoder = Arc::new(DialogflowDecoder::new(config.dialogflow.clone()));
        Self::with_decoder(config, decoder)
    }

    pub fn with_decoder(config: Arc<Config>, decoder: Arc<dyn EnvelopeDecoder>) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.sessions.replay_on_attach));
        Self {
            config,
            registry,
            decoder,
        }
    }
}
