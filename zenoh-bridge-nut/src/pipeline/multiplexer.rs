//! Turns device snapshots into per-variable updates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cache::SnapshotCache;
use crate::device::Device;
use crate::diff::{diff, removed};
use crate::error::Result;
use crate::messages::VariableUpdate;
use crate::metrics::BridgeMetrics;
use crate::pipeline::Shutdown;

/// Updates implied by `current` given the previously cached snapshot.
///
/// With no previous snapshot every variable is new. Otherwise only changed,
/// added and removed variables are reported; removals carry an empty value.
pub fn updates_for(previous: Option<&Device>, current: &Device) -> Vec<VariableUpdate> {
    let update = |variable: &str, value: &str, previous: Option<&String>| VariableUpdate {
        host: current.host.clone(),
        device: current.id.clone(),
        variable: variable.to_string(),
        value: value.to_string(),
        previous: previous.cloned(),
    };

    let Some(previous) = previous else {
        return current
            .variables
            .iter()
            .map(|(name, value)| update(name.as_str(), value.as_str(), None))
            .collect();
    };

    let old = &previous.variables;
    let mut updates: Vec<VariableUpdate> = diff(old, &current.variables)
        .iter()
        .map(|(name, value)| update(name.as_str(), value.as_str(), old.get(name)))
        .collect();
    updates.extend(
        removed(old, &current.variables)
            .iter()
            .map(|name| update(name.as_str(), "", old.get(name))),
    );
    updates
}

/// Fan snapshots out as updates to the metrics and converter stages.
pub async fn run(
    expiry: Duration,
    mut snapshots: mpsc::Receiver<Device>,
    to_metrics: mpsc::Sender<VariableUpdate>,
    to_converter: mpsc::Sender<VariableUpdate>,
    metrics: Arc<BridgeMetrics>,
    mut shutdown: Shutdown,
) -> Result<()> {
    let mut cache = SnapshotCache::new();

    while let Some(device) = shutdown.recv(&mut snapshots).await {
        let now = Instant::now();

        for key in cache.prune(expiry, now) {
            info!(device = %key, "Forgetting device not seen within expiry");
        }

        let updates = updates_for(cache.get(&device.key()).map(|e| &e.device), &device);
        debug!(device = %device.key(), updates = updates.len(), "Snapshot processed");
        cache.refresh(device, now);

        for update in updates {
            metrics.inc_variable_updates();
            if !shutdown
                .send(&to_metrics, update.clone(), "metrics")
                .await?
            {
                return Ok(());
            }
            if !shutdown.send(&to_converter, update, "converter").await? {
                return Ok(());
            }
        }
    }

    Ok(())
}
