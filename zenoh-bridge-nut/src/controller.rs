//! Wires the pipeline stages together and drives shutdown.

use std::sync::Arc;
use std::time::Duration;

use nutbridge_common::{BusTransport, KeyExprBuilder};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{NutConfig, PayloadFormat};
use crate::device::DeviceRegistry;
use crate::error::Result;
use crate::messages::{ControlMessage, OFFLINE, PipelineState};
use crate::metrics::{BridgeMetrics, MetricsSnapshot};
use crate::pipeline::{
    CHANNEL_CAPACITY, ShutdownTrigger, StageExit, control, converter, metrics_consumer,
    multiplexer, producer, publisher, spawn_stage,
};
use crate::upsd::UpsdClient;

/// How long stages get to finish once shutdown is signalled.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on closing the bus connection.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(250);

const STAGE_COUNT: usize = 6;

/// Pipeline settings derived from configuration.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub keys: KeyExprBuilder,
    pub payload: PayloadFormat,
    pub poll_interval: Duration,
    pub cache_expiry: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &NutConfig) -> Self {
        Self {
            keys: KeyExprBuilder::new(&config.key_prefix),
            payload: config.payload,
            poll_interval: config.poll_interval(),
            cache_expiry: config.cache_expiry(),
        }
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The stage whose exit ended the run.
    pub first_exit: StageExit,
    pub metrics: MetricsSnapshot,
}

impl RunSummary {
    /// Whether the run ended through a stage failure.
    pub fn failed(&self) -> bool {
        self.first_exit.error.is_some()
    }
}

/// Owns the bus, metrics and control channel of one pipeline run.
pub struct Controller<B: BusTransport> {
    bus: Arc<B>,
    settings: PipelineSettings,
    metrics: Arc<BridgeMetrics>,
    control_tx: mpsc::Sender<ControlMessage>,
    control_rx: mpsc::Receiver<ControlMessage>,
}

impl<B: BusTransport> Controller<B> {
    pub fn new(bus: Arc<B>, settings: PipelineSettings) -> Self {
        let (control_tx, control_rx) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            bus,
            settings,
            metrics: Arc::new(BridgeMetrics::new()),
            control_tx,
            control_rx,
        }
    }

    /// Sender for injecting control messages, e.g. on a signal.
    pub fn control(&self) -> mpsc::Sender<ControlMessage> {
        self.control_tx.clone()
    }

    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        self.metrics.clone()
    }

    /// Run the pipeline until the first stage exits, then shut it down.
    ///
    /// Sends `startup` once all stages are spawned.
    pub async fn run<C: UpsdClient + 'static>(
        self,
        registry: DeviceRegistry<C>,
    ) -> RunSummary {
        let Controller {
            bus,
            settings,
            metrics,
            control_tx,
            control_rx,
        } = self;

        let trigger = ShutdownTrigger::new();
        let (exit_tx, mut exit_rx) = mpsc::channel(STAGE_COUNT);
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (metrics_tx, metrics_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (converter_tx, converter_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (bus_tx, bus_rx) = mpsc::channel(CHANNEL_CAPACITY);

        info!(
            hosts = registry.len(),
            prefix = settings.keys.prefix(),
            "Starting pipeline"
        );

        let mut stages: Vec<(&'static str, JoinHandle<Result<()>>)> = Vec::new();

        stages.push((
            "control",
            spawn_stage(
                "control",
                exit_tx.clone(),
                control::run(
                    control_rx,
                    bus_tx.clone(),
                    state_tx,
                    metrics.clone(),
                    trigger.subscribe(),
                ),
            ),
        ));
        let publisher_handle = spawn_stage(
            "publisher",
            exit_tx.clone(),
            publisher::run(
                bus.clone(),
                settings.keys.clone(),
                settings.payload,
                bus_rx,
                metrics.clone(),
                trigger.subscribe(),
            ),
        );
        stages.push((
            "converter",
            spawn_stage(
                "converter",
                exit_tx.clone(),
                converter::run(converter_rx, bus_tx, trigger.subscribe()),
            ),
        ));
        stages.push((
            "metrics",
            spawn_stage(
                "metrics",
                exit_tx.clone(),
                metrics_consumer::run(metrics_rx, metrics.clone(), trigger.subscribe()),
            ),
        ));
        stages.push((
            "multiplexer",
            spawn_stage(
                "multiplexer",
                exit_tx.clone(),
                multiplexer::run(
                    settings.cache_expiry,
                    snapshot_rx,
                    metrics_tx,
                    converter_tx,
                    metrics.clone(),
                    trigger.subscribe(),
                ),
            ),
        ));
        stages.push((
            "producer",
            spawn_stage(
                "producer",
                exit_tx,
                producer::run(
                    registry,
                    settings.poll_interval,
                    state_rx,
                    snapshot_tx,
                    control_tx.clone(),
                    metrics.clone(),
                    trigger.subscribe(),
                ),
            ),
        ));

        let mut startup_shutdown = trigger.subscribe();
        if let Err(e) = startup_shutdown
            .send(
                &control_tx,
                ControlMessage::startup("bridge started"),
                "control",
            )
            .await
        {
            warn!(error = %e, "Could not request startup");
        }

        let first_exit = match exit_rx.recv().await {
            Some(exit) => exit,
            None => StageExit {
                stage: "controller",
                error: Some("all stages vanished".to_string()),
            },
        };
        info!(stage = first_exit.stage, "Stage exited, shutting down pipeline");
        trigger.trigger();

        let deadline = Instant::now() + JOIN_TIMEOUT;
        for (stage, mut handle) in stages {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(stage, error = %e, "Stage did not complete"),
                Err(_) => {
                    warn!(stage, "Stage did not stop in time, aborting");
                    handle.abort();
                }
            }
        }

        let mut publisher_handle = publisher_handle;
        let announce_offline = match tokio::time::timeout_at(deadline, &mut publisher_handle).await
        {
            Ok(Ok(Ok(announced))) => !announced,
            Ok(Ok(Err(_))) => false,
            Ok(Err(e)) => {
                warn!(stage = "publisher", error = %e, "Stage did not complete");
                true
            }
            Err(_) => {
                warn!(stage = "publisher", "Stage did not stop in time, aborting");
                publisher_handle.abort();
                true
            }
        };

        if announce_offline {
            let key = settings.keys.state_key();
            match bus.publish(&key, OFFLINE.as_bytes().to_vec()).await {
                Ok(()) => {
                    metrics.inc_bus_publishes();
                    info!(key = %key, "Published offline");
                }
                Err(e) => warn!(key = %key, error = %e, "Failed to publish offline"),
            }
        }

        bus.disconnect(DISCONNECT_TIMEOUT).await;

        let snapshot = metrics.snapshot();
        match serde_json::to_string(&snapshot) {
            Ok(json) => info!(metrics = %json, "Pipeline stopped"),
            Err(e) => warn!(error = %e, "Pipeline stopped, metrics not serializable"),
        }

        RunSummary {
            first_exit,
            metrics: snapshot,
        }
    }
}
