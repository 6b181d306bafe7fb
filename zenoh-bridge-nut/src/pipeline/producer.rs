//! Polling stage: sweeps every upsd host and forwards device snapshots.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::device::{Device, DeviceRegistry, HostEntry, fetch_and_merge, list_devices};
use crate::error::{BridgeError, Result};
use crate::messages::{ControlMessage, PipelineState};
use crate::metrics::BridgeMetrics;
use crate::pipeline::Shutdown;
use crate::upsd::UpsdClient;

/// Poll all hosts once per `interval`.
///
/// Waits for the pipeline to reach [`PipelineState::Running`] before the
/// first sweep. An upsd failure is turned into a `shutdown` control message,
/// after which the stage idles until shutdown.
pub async fn run<C: UpsdClient + 'static>(
    mut registry: DeviceRegistry<C>,
    interval: Duration,
    mut state: watch::Receiver<PipelineState>,
    snapshots: mpsc::Sender<Device>,
    control: mpsc::Sender<ControlMessage>,
    metrics: Arc<BridgeMetrics>,
    mut shutdown: Shutdown,
) -> Result<()> {
    tokio::select! {
        running = async { state.wait_for(|s| *s == PipelineState::Running).await.is_ok() } => {
            if !running {
                return Ok(());
            }
        }
        _ = shutdown.wait() => return Ok(()),
    }

    info!(
        hosts = registry.len(),
        interval_secs = interval.as_secs(),
        "Starting upsd polling"
    );

    loop {
        if shutdown.is_set() {
            return Ok(());
        }

        let mut sweep_shutdown = shutdown.clone();
        let outcome = tokio::select! {
            outcome = sweep(&mut registry, &snapshots, &mut sweep_shutdown) => outcome,
            _ = shutdown.wait() => return Ok(()),
        };

        match outcome {
            Ok(true) => {
                metrics.inc_poll_sweeps();
            }
            Ok(false) => return Ok(()),
            Err(BridgeError::Upsd(e)) => {
                error!(error = %e, "Polling failed, requesting shutdown");
                shutdown
                    .send(&control, ControlMessage::shutdown(e.to_string()), "control")
                    .await?;
                shutdown.wait().await;
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.wait() => return Ok(()),
        }
    }
}

/// Poll every host once. Returns `Ok(false)` if interrupted by shutdown.
async fn sweep<C: UpsdClient>(
    registry: &mut DeviceRegistry<C>,
    snapshots: &mpsc::Sender<Device>,
    shutdown: &mut Shutdown,
) -> Result<bool> {
    for host in registry.hosts_mut() {
        let listed = list_devices(&host.client).await?;
        host.reconcile(listed);

        let HostEntry { client, devices } = host;
        for device in devices.iter_mut() {
            let changes = fetch_and_merge(client, device).await?;
            debug!(
                host = client.host(),
                device = %device.id,
                changes = changes.len(),
                "Fetched variables"
            );

            if !shutdown
                .send(snapshots, device.clone(), "multiplexer")
                .await?
            {
                return Ok(false);
            }
        }
    }
    Ok(true)
}
