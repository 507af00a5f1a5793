//! Time-of-flight ranger (VL53L0X class) on the I²C bus.
//!
//! Later board revisions replaced the ultrasonic ranger with a laser ToF
//! module: immune to soft surfaces and air currents, same mounting, same
//! capability. The driver polls the result register and converts mm → cm.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: real I²C register reads via hw_init helpers.
//! On host/test: reads an injectable simulation value.

use crate::error::SensorError;
use crate::sensors::validate_range;

#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;
#[cfg(target_os = "espidf")]
use crate::pins;

/// Result register holding the latest range in millimetres (big-endian).
#[cfg(target_os = "espidf")]
const REG_RESULT_RANGE_MM: u8 = 0x1E;

/// The device reports 8190/8191 mm when no target reflects enough signal.
#[cfg(target_os = "espidf")]
const NO_TARGET_SENTINEL_MM: u16 = 8190;

#[cfg(not(target_os = "espidf"))]
mod sim {
    use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    static SIM_RANGE_CENTI_CM: AtomicU32 = AtomicU32::new(6000);
    static SIM_BUS_DOWN: AtomicBool = AtomicBool::new(false);

    pub fn set_height_cm(cm: f64) {
        SIM_RANGE_CENTI_CM.store((cm * 100.0).round() as u32, Ordering::Relaxed);
    }

    pub fn set_bus_down(down: bool) {
        SIM_BUS_DOWN.store(down, Ordering::Relaxed);
    }

    pub fn read() -> Option<f64> {
        if SIM_BUS_DOWN.load(Ordering::Relaxed) {
            None
        } else {
            Some(f64::from(SIM_RANGE_CENTI_CM.load(Ordering::Relaxed)) / 100.0)
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::{set_bus_down as sim_set_bus_down, set_height_cm as sim_set_height_cm};

pub struct TofSensor;

impl TofSensor {
    pub fn new() -> Self {
        Self
    }

    #[cfg(target_os = "espidf")]
    pub fn read_height_cm(&mut self) -> Result<f64, SensorError> {
        let range_mm = hw_init::i2c_read_u16(pins::TOF_I2C_ADDR, REG_RESULT_RANGE_MM)
            .map_err(|_| SensorError::BusReadFailed)?;

        if range_mm >= NO_TARGET_SENTINEL_MM {
            return Err(SensorError::OutOfRange);
        }

        validate_range(f64::from(range_mm) / 10.0)
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn read_height_cm(&mut self) -> Result<f64, SensorError> {
        let cm = sim::read().ok_or(SensorError::BusReadFailed)?;
        validate_range(cm)
    }
}
