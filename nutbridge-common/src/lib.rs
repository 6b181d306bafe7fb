//! nut2zenoh Common Library
//!
//! This crate provides shared types and utilities for the NUT to Zenoh bridge:
//!
//! - [`config`] - Configuration loading (JSON5 format)
//! - [`session`] - Zenoh session management
//! - [`bus`] - The [`BusTransport`] abstraction and its Zenoh implementation
//! - [`keyexpr`] - Key expression builders and validation
//! - [`serialization`] - JSON/CBOR encoding and decoding
//! - [`args`] - Common CLI arguments
//! - [`error`] - Error types

pub mod args;
pub mod bus;
pub mod config;
pub mod error;
pub mod keyexpr;
pub mod serialization;
pub mod session;

// Re-export commonly used types at the crate root
pub use args::BridgeArgs;
pub use bus::{BusTransport, ZenohBus};
pub use config::{LogFormat, LoggingConfig, ZenohConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use keyexpr::{KEY_PREFIX, KeyExprBuilder, validate_prefix};
pub use serialization::{Format, decode, encode};
pub use session::connect;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
