//! Hardware adapter — bridges real peripherals to domain port traits.
//!
//! Owns the fitted [`HeightSensor`] and the [`RelayDriver`], exposing
//! them through [`SensorPort`] and [`RelayPort`]. This is the only
//! module in the system that touches actual hardware. On non-espidf
//! targets, the underlying drivers use cfg-gated simulation stubs.

use crate::app::ports::{RelayPort, SensorPort};
use crate::drivers::relay::RelayDriver;
use crate::error::SensorError;
use crate::sensors::HeightSensor;

/// Concrete adapter that combines all hardware behind port traits.
pub struct HardwareAdapter {
    sensor: HeightSensor,
    relays: RelayDriver,
}

impl HardwareAdapter {
    pub fn new(sensor: HeightSensor, relays: RelayDriver) -> Self {
        Self { sensor, relays }
    }

    /// Whether either relay coil is currently energised.
    pub fn any_relay_active(&self) -> bool {
        self.relays.any_active()
    }
}

// ── SensorPort implementation ─────────────────────────────────

impl SensorPort for HardwareAdapter {
    fn read_height_cm(&mut self) -> Result<f64, SensorError> {
        self.sensor.read_height_cm()
    }
}

// ── RelayPort implementation ──────────────────────────────────

impl RelayPort for HardwareAdapter {
    fn set_up(&mut self, active: bool) {
        self.relays.set_up(active);
    }

    fn set_down(&mut self, active: bool) {
        self.relays.set_down(active);
    }

    fn all_off(&mut self) {
        self.relays.all_off();
    }
}
