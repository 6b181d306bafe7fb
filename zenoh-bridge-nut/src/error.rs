//! Error types for the NUT bridge.

use thiserror::Error;

use crate::config::ConfigError;
use crate::upsd::UpsdError;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that end a pipeline stage.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// upsd exchange or response error.
    #[error("upsd error: {0}")]
    Upsd(#[from] UpsdError),

    /// Bus publish or serialization error.
    #[error("Bus error: {0}")]
    Transport(#[from] nutbridge_common::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A downstream stage hung up.
    #[error("Channel to {0} closed")]
    ChannelClosed(&'static str),
}
