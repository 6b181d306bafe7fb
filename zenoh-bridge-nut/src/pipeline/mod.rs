//! Pipeline stages and the plumbing shared between them.
//!
//! ```text
//! producer -> multiplexer -+-> metrics
//!                          +-> converter -> publisher <- control
//! ```
//!
//! Stages are connected by single-slot channels, so a slow consumer holds
//! back everything upstream of it. Every stage watches the same shutdown
//! flag and reports its exit on a shared exit channel.

pub mod control;
pub mod converter;
pub mod metrics_consumer;
pub mod multiplexer;
pub mod producer;
pub mod publisher;

use std::future::Future;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{BridgeError, Result};

/// Capacity of every inter-stage channel.
pub const CHANNEL_CAPACITY: usize = 1;

/// Owner side of the shutdown flag.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownTrigger {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Stage side of the shutdown flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested (or the trigger is gone).
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|set| *set).await;
    }

    /// Receive the next message, or `None` on shutdown or a closed channel.
    ///
    /// Queued messages are still delivered after shutdown is requested.
    pub async fn recv<T>(&mut self, rx: &mut mpsc::Receiver<T>) -> Option<T> {
        tokio::select! {
            biased;
            msg = rx.recv() => msg,
            _ = self.wait() => None,
        }
    }

    /// Send downstream, waiting for capacity.
    ///
    /// Returns `Ok(false)` if shutdown was requested first.
    pub async fn send<T>(
        &mut self,
        tx: &mpsc::Sender<T>,
        value: T,
        to: &'static str,
    ) -> Result<bool> {
        tokio::select! {
            biased;
            _ = self.wait() => Ok(false),
            sent = tx.send(value) => sent
                .map(|_| true)
                .map_err(|_| BridgeError::ChannelClosed(to)),
        }
    }
}

/// Report sent by a stage when it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageExit {
    pub stage: &'static str,
    /// Description of the failure, if the stage failed.
    pub error: Option<String>,
}

/// Spawn a stage, reporting its exit on `exits`.
///
/// `exits` must have room for one report per stage.
pub fn spawn_stage<T, F>(
    stage: &'static str,
    exits: mpsc::Sender<StageExit>,
    future: F,
) -> JoinHandle<Result<T>>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = future.await;
        let error = match &result {
            Ok(_) => {
                debug!(stage, "Stage finished");
                None
            }
            Err(e) => {
                error!(stage, error = %e, "Stage failed");
                Some(e.to_string())
            }
        };
        let _ = exits.try_send(StageExit { stage, error });
        result
    })
}
