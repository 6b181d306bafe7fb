use thiserror::Error;

/// Common error type for the bridge's shared plumbing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR serialization error: {0}")]
    Cbor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to publish to {topic}: {message}")]
    Transport { topic: String, message: String },

    #[error("Invalid key expression: {0}")]
    KeyExpr(String),
}

impl Error {
    /// Create a transport error for a topic.
    pub fn transport(topic: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            topic: topic.into(),
            message: message.to_string(),
        }
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for Error {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

impl From<ciborium::de::Error<std::io::Error>> for Error {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        Error::Cbor(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
