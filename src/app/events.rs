//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them — log to serial, publish to MQTT
//! state topics, etc.

use crate::error::SensorError;
use crate::motion::MotionState;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Periodic telemetry snapshot.
    Telemetry(TelemetryData),

    /// The desk started or stopped moving, or changed direction.
    MotionChanged { from: MotionState, to: MotionState },

    /// A new automatic-mode target was accepted (already clamped to the
    /// configured bounds).
    TargetSet { target_cm: f64 },

    /// Automatic seeking converged inside the deadband.
    TargetReached { target_cm: f64, height_cm: f64 },

    /// A paddle edge cancelled automatic seeking.
    ManualOverride,

    /// The current height moved onto (or off) a preset slot.
    PresetChanged(Option<usize>),

    /// A preset slot was overwritten with the current height.
    PresetSaved { slot: usize, height_cm: f64 },

    /// A height reading failed; the control decision was skipped.
    SensorFault(SensorError),

    /// The application service has started.
    Started,
}

/// A point-in-time telemetry snapshot suitable for logging or transmission.
#[derive(Debug, Clone)]
pub struct TelemetryData {
    pub motion: MotionState,
    /// Last valid height reading, if any arrived yet.
    pub height_cm: Option<f64>,
    /// Active target while automatic mode is engaged.
    pub target_cm: Option<f64>,
    pub automatic: bool,
    /// Preset slot the height currently sits on.
    pub preset: Option<usize>,
}
