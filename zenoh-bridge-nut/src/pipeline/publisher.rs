//! Publishes bus messages through the transport.

use std::sync::Arc;

use nutbridge_common::{BusTransport, KeyExprBuilder, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::PayloadFormat;
use crate::error::Result;
use crate::messages::{BusMessage, BusMessageKind};
use crate::metrics::BridgeMetrics;
use crate::pipeline::Shutdown;

/// Logged in place of a missing previous value.
pub const NO_PREVIOUS: &str = "[null]";

/// Structured variable payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariablePayload {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Encode a message body according to `format`.
///
/// Availability messages are always the bare text.
pub fn payload_for(message: &BusMessage, format: PayloadFormat) -> Result<Vec<u8>> {
    let structured = match message.kind {
        BusMessageKind::Availability => None,
        BusMessageKind::Variable => format.structured(),
    };

    match structured {
        None => Ok(message.content.clone().into_bytes()),
        Some(format) => {
            let payload = VariablePayload {
                value: message.content.clone(),
                previous: message.previous.clone(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            };
            Ok(encode(&payload, format)?)
        }
    }
}

/// Publish until `offline` goes out or the input ends.
///
/// Returns whether `offline` was published. A failed availability publish
/// ends the stage with an error; failed variable publishes are counted and
/// skipped.
pub async fn run<B: BusTransport>(
    bus: Arc<B>,
    keys: KeyExprBuilder,
    format: PayloadFormat,
    mut messages: mpsc::Receiver<BusMessage>,
    metrics: Arc<BridgeMetrics>,
    mut shutdown: Shutdown,
) -> Result<bool> {
    while let Some(message) = shutdown.recv(&mut messages).await {
        let key = keys.build(&message.topic);

        match message.kind {
            BusMessageKind::Availability => {
                info!(key = %key, state = %message.content, "Publishing availability");
                bus.publish(&key, message.content.clone().into_bytes())
                    .await?;
                metrics.inc_bus_publishes();

                if message.is_offline() {
                    return Ok(true);
                }
            }
            BusMessageKind::Variable => {
                info!(
                    "{}: {} -> {}",
                    message.topic,
                    message.previous.as_deref().unwrap_or(NO_PREVIOUS),
                    message.content
                );

                let published = match payload_for(&message, format) {
                    Ok(payload) => bus.publish(&key, payload).await.map_err(Into::into),
                    Err(e) => Err(e),
                };

                match published {
                    Ok(()) => {
                        metrics.inc_bus_publishes();
                        debug!(key = %key, "Published variable");
                    }
                    Err(e) => {
                        metrics.inc_bus_publish_failures();
                        warn!(key = %key, error = %e, "Failed to publish variable");
                    }
                }
            }
        }
    }

    Ok(false)
}
