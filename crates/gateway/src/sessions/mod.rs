pub mod registry;
pub mod ws;

pub use registry::{
    AttachOutcome, DeliveryChannel, DeliveryOutcome, PushFailure, RegistryStats, SessionRegistry,
};
