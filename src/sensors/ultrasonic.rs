//! Ultrasonic ranger (HC-SR04 class).
//!
//! A 10 µs trigger pulse starts a ranging cycle; the echo pin goes high
//! for the sound round-trip time. Distance follows from the speed of
//! sound: `cm = echo_us * 0.0343 / 2`. The sensor sits under the desk
//! top facing the floor, so the measured distance IS the desk height.
//!
//! The echo wait is the single bounded synchronous call in the system;
//! a missing echo times out after [`ECHO_TIMEOUT_US`] and surfaces as
//! [`SensorError::EchoTimeout`].
//!
//! ## Dual-target design
//!
//! On ESP-IDF: real trigger/echo timing via hw_init helpers.
//! On host/test: reads an injectable simulation value.

use crate::error::SensorError;
use crate::sensors::validate_range;

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;
#[cfg(target_os = "espidf")]
use crate::pins;

/// Speed of sound at room temperature, cm per µs.
#[cfg(target_os = "espidf")]
const SOUND_CM_PER_US: f64 = 0.0343;

/// Echo listen window (µs). Far beyond the longest plausible range, so a
/// timeout means a missing or wedged sensor rather than a tall desk.
#[cfg(target_os = "espidf")]
const ECHO_TIMEOUT_US: u64 = 1_000_000;

#[cfg(not(target_os = "espidf"))]
mod sim {
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Height in hundredths of a cm (fixed point, atomically settable).
    static SIM_HEIGHT_CENTI_CM: AtomicU32 = AtomicU32::new(6000);
    static SIM_FAILING: AtomicBool = AtomicBool::new(false);

    pub fn set_height_cm(cm: f64) {
        SIM_HEIGHT_CENTI_CM.store((cm * 100.0).round() as u32, Ordering::Relaxed);
    }

    pub fn set_failing(failing: bool) {
        SIM_FAILING.store(failing, Ordering::Relaxed);
    }

    pub fn read() -> Option<f64> {
        if SIM_FAILING.load(Ordering::Relaxed) {
            None
        } else {
            Some(f64::from(SIM_HEIGHT_CENTI_CM.load(Ordering::Relaxed)) / 100.0)
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::{set_failing as sim_set_failing, set_height_cm as sim_set_height_cm};

pub struct UltrasonicSensor;

impl UltrasonicSensor {
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "espidf")]
    pub fn read_height_cm(&mut self) -> Result<f64, SensorError> {
        // Settle low, then a 10 µs trigger pulse.
        hw_init::gpio_write(pins::SENSOR_TRIGGER_GPIO, false);
        hw_init::busy_wait_us(2);
        hw_init::gpio_write(pins::SENSOR_TRIGGER_GPIO, true);
        hw_init::busy_wait_us(10);
        hw_init::gpio_write(pins::SENSOR_TRIGGER_GPIO, false);

        let echo_us = hw_init::pulse_high_us(pins::SENSOR_ECHO_GPIO, ECHO_TIMEOUT_US)
            .ok_or(SensorError::EchoTimeout)?;

        validate_range(echo_us as f64 * SOUND_CM_PER_US / 2.0)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn read_height_cm(&mut self) -> Result<f64, SensorError> {
        let cm = sim::read().ok_or(SensorError::EchoTimeout)?;
        validate_range(cm)
    }
}
