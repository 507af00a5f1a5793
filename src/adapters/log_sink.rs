//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).
//! The MQTT adapter implements the same trait for the network side.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

fn fmt_opt_cm(v: Option<f64>) -> heapless::String<16> {
    use core::fmt::Write;
    let mut s = heapless::String::new();
    match v {
        Some(cm) => {
            let _ = write!(s, "{:.1}cm", cm);
        }
        None => {
            let _ = s.push_str("--");
        }
    }
    s
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Telemetry(t) => {
                info!(
                    "TELEM | motion={:?} | height={} | target={} | auto={} | preset={:?}",
                    t.motion,
                    fmt_opt_cm(t.height_cm),
                    fmt_opt_cm(t.target_cm),
                    t.automatic,
                    t.preset,
                );
            }
            AppEvent::MotionChanged { from, to } => {
                info!("MOTION | {:?} -> {:?}", from, to);
            }
            AppEvent::TargetSet { target_cm } => {
                info!("TARGET | set {:.1}cm", target_cm);
            }
            AppEvent::TargetReached {
                target_cm,
                height_cm,
            } => {
                info!("TARGET | reached {:.1}cm (at {:.1}cm)", target_cm, height_cm);
            }
            AppEvent::ManualOverride => {
                info!("MANUAL | override, automatic mode off");
            }
            AppEvent::PresetChanged(preset) => match preset {
                Some(slot) => info!("PRESET | on slot {}", slot + 1),
                None => info!("PRESET | off preset"),
            },
            AppEvent::PresetSaved { slot, height_cm } => {
                info!("PRESET | slot {} saved at {:.1}cm", slot + 1, height_cm);
            }
            AppEvent::SensorFault(e) => {
                warn!("SENSOR | fault: {}", e);
            }
            AppEvent::Started => {
                info!("START | controller ready");
            }
        }
    }
}
