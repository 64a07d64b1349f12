/// Shared error type used across all IntentRelay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("invalid identity: {0}")]
    Identity(String),
}

pub type Result<T> = std::result::Result<T, Error>;
