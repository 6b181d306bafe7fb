//! Lifecycle state machine.
//!
//! `Idle -> Running` on the first `startup`, `-> Stopped` on `shutdown`.
//! Returning from this stage is the controlled way the bridge stops.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::error::Result;
use crate::messages::{BusMessage, ControlMessage, ControlOperation, PipelineState};
use crate::metrics::BridgeMetrics;
use crate::pipeline::Shutdown;

pub async fn run(
    mut messages: mpsc::Receiver<ControlMessage>,
    to_publisher: mpsc::Sender<BusMessage>,
    state: watch::Sender<PipelineState>,
    metrics: Arc<BridgeMetrics>,
    mut shutdown: Shutdown,
) -> Result<()> {
    while let Some(message) = shutdown.recv(&mut messages).await {
        metrics.inc_control_messages();
        let current = *state.borrow();

        match message.operation {
            ControlOperation::Startup if current == PipelineState::Idle => {
                info!(comment = %message.comment, "Starting pipeline");
                if !shutdown
                    .send(&to_publisher, BusMessage::online(), "publisher")
                    .await?
                {
                    return Ok(());
                }
                state.send_replace(PipelineState::Running);
            }
            ControlOperation::Startup => {
                info!(state = ?current, "Ignoring startup, pipeline already started");
            }
            ControlOperation::Shutdown => {
                info!(comment = %message.comment, "Stopping pipeline");
                state.send_replace(PipelineState::Stopped);
                shutdown
                    .send(&to_publisher, BusMessage::offline(), "publisher")
                    .await?;
                return Ok(());
            }
            ControlOperation::Unknown(op) => {
                warn!(operation = %op, comment = %message.comment, "Unknown control operation");
            }
        }
    }

    Ok(())
}
