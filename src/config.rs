//! System configuration parameters
//!
//! All tunable parameters for the desk controller. Values can be overridden
//! via NVS or an MQTT config command; presets are edited at runtime and
//! persisted alongside the rest.

use serde::{Deserialize, Serialize};

/// Maximum number of stored height presets.
pub const MAX_PRESETS: usize = 3;

/// Which distance sensor variant is fitted. Selected at config time;
/// both expose the same `read_height_cm` capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorKind {
    /// HC-SR04 class ultrasonic ranger (trigger/echo pulse timing).
    Ultrasonic,
    /// VL53L0X class time-of-flight ranger on the I²C bus.
    TimeOfFlight,
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeskConfig {
    // --- Motion ---
    /// Lowest height (cm) automatic seeking may target.
    pub min_height_cm: f64,
    /// Highest height (cm) automatic seeking may target.
    pub max_height_cm: f64,
    /// Deadband radius (cm): within this distance of the target the desk
    /// counts as arrived and motion stops.
    pub target_accuracy_cm: f64,
    /// Minimum time after stopping before either relay may re-engage (ms).
    pub switch_delay_ms: u64,

    // --- Presets ---
    /// Stored preset heights (cm), slot order is recall priority order.
    pub presets: heapless::Vec<f64, MAX_PRESETS>,

    // --- Sensor ---
    /// Fitted distance sensor variant.
    pub sensor: SensorKind,

    // --- Timing ---
    /// Control loop interval (milliseconds)
    pub control_loop_interval_ms: u32,
    /// Telemetry report interval (seconds)
    pub telemetry_interval_secs: u32,
    /// Minimum spacing between height state publishes (milliseconds).
    pub height_publish_min_interval_ms: u32,
}

impl Default for DeskConfig {
    fn default() -> Self {
        let mut presets = heapless::Vec::new();
        // Sitting, standing, tall-standing defaults; all within bounds.
        let _ = presets.push(72.0);
        let _ = presets.push(100.0);
        let _ = presets.push(110.0);

        Self {
            // Motion
            min_height_cm: 60.0,
            max_height_cm: 125.0,
            target_accuracy_cm: 5.0,
            switch_delay_ms: 4000,

            presets,

            sensor: SensorKind::Ultrasonic,

            // Timing
            control_loop_interval_ms: 100, // 10 Hz
            telemetry_interval_secs: 30,
            height_publish_min_interval_ms: 2000,
        }
    }
}
