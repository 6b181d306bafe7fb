//! Topic naming for variable updates.
//!
//! ```text
//! hosts/<host>/<device>/<variable with '.' replaced by '/'>
//! ```

use crate::messages::{BusMessage, BusMessageKind, VariableUpdate};

/// Topic (relative to the key prefix) for a variable.
pub fn topic_for(host: &str, device: &str, variable: &str) -> String {
    format!("hosts/{}/{}/{}", host, device, variable.replace('.', "/"))
}

/// Turn an update into a bus message.
pub fn convert(update: VariableUpdate) -> BusMessage {
    BusMessage {
        kind: BusMessageKind::Variable,
        topic: topic_for(&update.host, &update.device, &update.variable),
        content: update.value,
        previous: update.previous,
    }
}
