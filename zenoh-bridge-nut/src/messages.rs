//! Messages passed between pipeline stages.

use std::fmt;

/// Lifecycle operations understood by the control stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOperation {
    Startup,
    Shutdown,
    /// Anything else; logged and ignored.
    Unknown(String),
}

impl From<&str> for ControlOperation {
    fn from(s: &str) -> Self {
        match s {
            "startup" => ControlOperation::Startup,
            "shutdown" => ControlOperation::Shutdown,
            other => ControlOperation::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ControlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlOperation::Startup => write!(f, "startup"),
            ControlOperation::Shutdown => write!(f, "shutdown"),
            ControlOperation::Unknown(op) => write!(f, "{}", op),
        }
    }
}

/// A lifecycle request with a free-form reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub operation: ControlOperation,
    pub comment: String,
}

impl ControlMessage {
    pub fn new(operation: impl Into<ControlOperation>, comment: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            comment: comment.into(),
        }
    }

    pub fn startup(comment: impl Into<String>) -> Self {
        Self::new(ControlOperation::Startup, comment)
    }

    pub fn shutdown(comment: impl Into<String>) -> Self {
        Self::new(ControlOperation::Shutdown, comment)
    }
}

/// A single observed variable change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableUpdate {
    pub host: String,
    pub device: String,
    pub variable: String,
    /// Empty when the variable disappeared.
    pub value: String,
    /// `None` on first sighting.
    pub previous: Option<String>,
}

/// What a bus message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMessageKind {
    /// `online` / `offline` on the state topic.
    Availability,
    Variable,
}

/// A message ready to publish, with its topic relative to the key prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub kind: BusMessageKind,
    pub topic: String,
    pub content: String,
    pub previous: Option<String>,
}

pub const ONLINE: &str = "online";
pub const OFFLINE: &str = "offline";

impl BusMessage {
    pub fn availability(content: &str) -> Self {
        Self {
            kind: BusMessageKind::Availability,
            topic: nutbridge_common::keyexpr::STATE_SUFFIX.to_string(),
            content: content.to_string(),
            previous: None,
        }
    }

    pub fn online() -> Self {
        Self::availability(ONLINE)
    }

    pub fn offline() -> Self {
        Self::availability(OFFLINE)
    }

    pub fn is_offline(&self) -> bool {
        self.kind == BusMessageKind::Availability && self.content == OFFLINE
    }
}

/// Lifecycle state of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Running,
    Stopped,
}
