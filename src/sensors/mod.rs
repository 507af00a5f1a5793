//! Height sensing — the one ranging capability behind two drivers.
//!
//! Different board revisions shipped with an ultrasonic ranger or an I²C
//! time-of-flight ranger. Both expose the same `read_height_cm` call;
//! the fitted variant is selected by [`SensorKind`] in the config and
//! dispatched over this enum — no trait objects, no inheritance.

pub mod tof;
pub mod ultrasonic;

use crate::config::SensorKind;
use crate::error::SensorError;
use tof::TofSensor;
use ultrasonic::UltrasonicSensor;

/// Plausible desk-height window (cm). Readings outside are sensor faults,
/// not data.
pub const MIN_PLAUSIBLE_CM: f64 = 2.0;
pub const MAX_PLAUSIBLE_CM: f64 = 400.0;

/// Reject readings outside the physically plausible window.
pub(crate) fn validate_range(cm: f64) -> Result<f64, SensorError> {
    if !cm.is_finite() || !(MIN_PLAUSIBLE_CM..=MAX_PLAUSIBLE_CM).contains(&cm) {
        return Err(SensorError::OutOfRange);
    }
    Ok(cm)
}

/// The fitted distance sensor.
pub enum HeightSensor {
    Ultrasonic(UltrasonicSensor),
    TimeOfFlight(TofSensor),
}

impl HeightSensor {
    pub fn from_config(kind: SensorKind) -> Self {
        match kind {
            SensorKind::Ultrasonic => Self::Ultrasonic(UltrasonicSensor::new()),
            SensorKind::TimeOfFlight => Self::TimeOfFlight(TofSensor::new()),
        }
    }

    /// One bounded height measurement in centimetres.
    pub fn read_height_cm(&mut self) -> Result<f64, SensorError> {
        match self {
            Self::Ultrasonic(s) => s.read_height_cm(),
            Self::TimeOfFlight(s) => s.read_height_cm(),
        }
    }
}
