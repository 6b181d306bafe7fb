//! Maps variable updates onto bus topics.

use tokio::sync::mpsc;

use crate::error::Result;
use crate::messages::{BusMessage, VariableUpdate};
use crate::pipeline::Shutdown;
use crate::topic::convert;

pub async fn run(
    mut updates: mpsc::Receiver<VariableUpdate>,
    to_publisher: mpsc::Sender<BusMessage>,
    mut shutdown: Shutdown,
) -> Result<()> {
    while let Some(update) = shutdown.recv(&mut updates).await {
        if !shutdown
            .send(&to_publisher, convert(update), "publisher")
            .await?
        {
            break;
        }
    }
    Ok(())
}
