//! Outbound publish/subscribe transport.

use std::future::Future;
use std::time::Duration;

use zenoh::Session;

use crate::config::ZenohConfig;
use crate::error::{Error, Result};
use crate::session::connect;

/// A publish/subscribe transport the bridge republishes onto.
///
/// Topics passed to [`publish`](Self::publish) are complete key expressions.
pub trait BusTransport: Send + Sync + 'static {
    /// Publish a payload on a topic.
    fn publish(&self, topic: &str, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Close the transport, waiting at most `timeout`.
    fn disconnect(&self, timeout: Duration) -> impl Future<Output = ()> + Send;
}

/// [`BusTransport`] backed by a Zenoh session.
#[derive(Clone, Debug)]
pub struct ZenohBus {
    session: Session,
}

impl ZenohBus {
    /// Open a Zenoh session.
    pub async fn connect(config: &ZenohConfig) -> Result<Self> {
        let session = connect(config).await?;
        Ok(Self { session })
    }

    /// Wrap an already open session.
    pub fn from_session(session: Session) -> Self {
        Self { session }
    }

    /// Get a reference to the Zenoh session.
    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl BusTransport for ZenohBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.session
            .put(topic, payload)
            .await
            .map_err(|e| Error::transport(topic, e))
    }

    async fn disconnect(&self, timeout: Duration) {
        match tokio::time::timeout(timeout, self.session.close()).await {
            Ok(Ok(())) => tracing::info!("Zenoh session closed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Error closing Zenoh session"),
            Err(_) => tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "Timed out closing Zenoh session"
            ),
        }
    }
}
