//! Records gauges for well-known variables.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::messages::VariableUpdate;
use crate::metrics::{BridgeMetrics, gauge_name};
use crate::pipeline::Shutdown;

/// Apply one update to the gauges. Returns whether a gauge was set.
pub fn record(metrics: &BridgeMetrics, update: &VariableUpdate) -> bool {
    let Some(gauge) = gauge_name(&update.variable) else {
        return false;
    };

    if update.value.is_empty() {
        debug!(variable = %update.variable, device = %update.device, "Gauge variable removed");
        return false;
    }

    match update.value.trim().parse::<f64>() {
        Ok(value) => {
            metrics.set_gauge(&update.host, &update.device, gauge, value);
            true
        }
        Err(e) => {
            warn!(
                variable = %update.variable,
                device = %update.device,
                value = %update.value,
                error = %e,
                "Non-numeric value for gauge"
            );
            false
        }
    }
}

pub async fn run(
    mut updates: mpsc::Receiver<VariableUpdate>,
    metrics: Arc<BridgeMetrics>,
    mut shutdown: Shutdown,
) -> Result<()> {
    while let Some(update) = shutdown.recv(&mut updates).await {
        record(&metrics, &update);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(variable: &str, value: &str) -> VariableUpdate {
        VariableUpdate {
            host: "host1".into(),
            device: "ups1".into(),
            variable: variable.into(),
            value: value.into(),
            previous: None,
        }
    }

    #[test]
    fn test_records_known_numeric_variable() {
        let metrics = BridgeMetrics::new();
        assert!(record(&metrics, &update("input.voltage", "231.5")));
        assert_eq!(
            metrics.gauge("host1", "ups1", "input_voltage"),
            Some(231.5)
        );
    }

    #[test]
    fn test_skips_unknown_and_non_numeric() {
        let metrics = BridgeMetrics::new();
        assert!(!record(&metrics, &update("ups.status", "OL")));
        assert!(!record(&metrics, &update("ups.load", "n/a")));
        assert!(!record(&metrics, &update("ups.load", "")));
        assert!(metrics.snapshot().gauges.is_empty());
    }
}
