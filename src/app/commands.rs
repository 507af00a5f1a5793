//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (MQTT, serial)
//! that the [`AppService`](super::service::AppService) interprets and
//! acts upon. Payload validation (numeric parsing, finiteness, sign)
//! happens at the transport boundary; the service assumes well-formed
//! values and applies range clamping only.

use crate::config::DeskConfig;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Seek to an absolute height (cm). Engages automatic mode.
    SetTarget(f64),

    /// Halt motion and leave automatic mode.
    Stop,

    /// Seek to the height stored in the given preset slot (0-based).
    RecallPreset(u8),

    /// Store the current height into the given preset slot (0-based).
    SavePreset(u8),

    /// Hot-reload configuration (bounds, accuracy, switch delay, …).
    UpdateConfig(DeskConfig),

    /// Explicitly persist the current config to NVS immediately.
    SaveConfig,
}
