//! Dialogflow v2 webhook decoding.
//!
//! Turns a raw `WebhookRequest` body into the `(identity, intent)` pair the
//! relay routes on. The identity comes from the Google ID token that
//! Actions on Google embeds in the original detect-intent payload.

pub mod decoder;
pub mod id_token;
pub mod webhook;

pub use decoder::{Decoded, DecodeError, DialogflowDecoder, EnvelopeDecoder};
pub use id_token::IdTokenClaims;
