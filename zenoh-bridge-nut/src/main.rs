//! Zenoh bridge for Network UPS Tools.
//!
//! Polls upsd servers and publishes UPS variable changes to Zenoh.

use std::sync::Arc;

use anyhow::{Context, Result};
use nutbridge_common::{BridgeArgs, LoggingConfig, ZenohBus};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use zenoh_bridge_nut::config::NutBridgeConfig;
use zenoh_bridge_nut::device::DeviceRegistry;
use zenoh_bridge_nut::messages::ControlMessage;
use zenoh_bridge_nut::{Controller, PipelineSettings};

#[tokio::main]
async fn main() -> Result<()> {
    let args = BridgeArgs::parse_with_default("nut.json5").unwrap_or_else(|e| e.exit());

    // Load configuration
    let mut config = NutBridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    config.zenoh = config.zenoh.with_password_from_env();

    // Initialize logging
    let log_config = LoggingConfig {
        level: args.log_level_or(&config.logging.level),
        format: config.logging.format,
    };
    nutbridge_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting zenoh-bridge-nut");
    info!("Loaded configuration from {:?}", args.config);

    let hosts = config.nut.host_addrs()?;
    let registry = DeviceRegistry::from_addrs(&hosts, config.nut.request_timeout());

    // Connect to Zenoh
    info!("Connecting to Zenoh...");
    let bus = ZenohBus::connect(&config.zenoh)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to Zenoh: {}", e))?;
    info!(zid = %bus.session().zid(), "Connected to Zenoh");

    let controller = Controller::new(
        Arc::new(bus),
        PipelineSettings::from_config(&config.nut),
    );

    tokio::spawn(forward_signals(controller.control()));

    info!(hosts = hosts.len(), "NUT bridge running");

    let summary = controller.run(registry).await;

    if let Some(e) = &summary.first_exit.error {
        error!(stage = summary.first_exit.stage, error = %e, "Bridge stopped on failure");
        anyhow::bail!("stage {} failed: {}", summary.first_exit.stage, e);
    }

    info!("NUT bridge stopped");
    Ok(())
}

/// Turn Ctrl+C or SIGTERM into a `shutdown` control message.
async fn forward_signals(control: mpsc::Sender<ControlMessage>) {
    let comment = tokio::select! {
        _ = tokio::signal::ctrl_c() => "received Ctrl+C",
        _ = terminate() => "received SIGTERM",
    };
    info!("{}, shutting down...", comment);

    if control.send(ControlMessage::shutdown(comment)).await.is_err() {
        warn!("Pipeline already stopped");
    }
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
