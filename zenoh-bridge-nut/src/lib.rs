//! Zenoh bridge for Network UPS Tools.
//!
//! This bridge polls one or more upsd servers and republishes every observed
//! UPS variable change to Zenoh.
//!
//! # Key Expressions
//!
//! ```text
//! nut/state                                   online | offline
//! nut/hosts/<host>/<device>/<variable path>   variable value
//! ```
//!
//! Where:
//! - `<host>` - upsd host as configured
//! - `<device>` - UPS name reported by `LIST UPS`
//! - `<variable path>` - NUT variable with `.` replaced by `/`
//!   (`battery.charge` becomes `battery/charge`)

pub mod cache;
pub mod config;
pub mod controller;
pub mod device;
pub mod diff;
pub mod error;
pub mod messages;
pub mod metrics;
pub mod pipeline;
pub mod topic;
pub mod upsd;

pub use controller::{Controller, PipelineSettings, RunSummary};
pub use error::{BridgeError, Result};
