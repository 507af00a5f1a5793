//! Smart Desk Firmware — Main Entry Point
//!
//! Hexagonal architecture with event-driven execution.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                   │
//! │                                                              │
//! │  HardwareAdapter   LogEventSink    NvsAdapter   Esp32Time    │
//! │  (Sensor+Relay)    (EventSink)     (ConfigPort) (monotonic)  │
//! │  WifiAdapter       MqttAdapter                               │
//! │  (Connectivity)    (EventSink + commands + HA discovery)     │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │              AppService (pure logic)                   │  │
//! │  │  Motion controller · Height seek · Presets             │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ordering rule enforced here: paddle edges are pushed into the event
//! queue BEFORE the control tick of the same iteration, so the FIFO
//! drain clears automatic mode before any seek decision runs.
#![deny(unused_must_use)]

use anyhow::Result;
use log::{info, warn};

use smartdesk::adapters::device_id;
use smartdesk::adapters::hardware::HardwareAdapter;
use smartdesk::adapters::log_sink::LogEventSink;
use smartdesk::adapters::mqtt::MqttAdapter;
use smartdesk::adapters::nvs::NvsAdapter;
use smartdesk::adapters::time::Esp32TimeAdapter;
use smartdesk::adapters::wifi::{ConnectivityPort, WifiAdapter};
use smartdesk::app::events::AppEvent;
use smartdesk::app::ports::{ConfigPort, EventSink};
use smartdesk::app::service::{AppService, ManualInput};
use smartdesk::config::{DeskConfig, SensorKind};
use smartdesk::drivers::buttons::{PaddleEvent, PaddleInput};
use smartdesk::drivers::relay::RelayDriver;
use smartdesk::drivers::watchdog::Watchdog;
use smartdesk::drivers::hw_init;
use smartdesk::events::{self, push_event, Event};
use smartdesk::ota;
use smartdesk::sensors::HeightSensor;

// ── Compile-time network configuration ────────────────────────
//
// Baked in at build, like the original firmware's config header:
//   SMARTDESK_WIFI_SSID=HomeNet SMARTDESK_MQTT_BROKER=mqtt://... cargo build
const WIFI_SSID: Option<&str> = option_env!("SMARTDESK_WIFI_SSID");
const WIFI_PASS: Option<&str> = option_env!("SMARTDESK_WIFI_PASS");
const MQTT_BROKER: Option<&str> = option_env!("SMARTDESK_MQTT_BROKER");
const MQTT_USER: Option<&str> = option_env!("SMARTDESK_MQTT_USER");
const MQTT_PASS: Option<&str> = option_env!("SMARTDESK_MQTT_PASS");

// ── Fan-out sink ──────────────────────────────────────────────
//
// Every domain event goes to the serial log AND the MQTT state topics.
// The MQTT side drops events silently while the broker is down.

struct FanoutSink<'a> {
    log: &'a mut LogEventSink,
    mqtt: &'a mut MqttAdapter,
}

impl EventSink for FanoutSink<'_> {
    fn emit(&mut self, event: &AppEvent) {
        self.log.emit(event);
        self.mqtt.emit(event);
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. Platform bootstrap ─────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }

    info!("Smart Desk v{}", env!("CARGO_PKG_VERSION"));

    // ── 1b. OTA rollback check ────────────────────────────────
    ota::check_rollback();

    // ── 1c. Initialise hardware peripherals ───────────────────
    if let Err(e) = hw_init::init_peripherals() {
        // Peripheral init failure is critical — log and halt.
        // In production this triggers the watchdog reset after timeout.
        log::error!("HAL init failed: {} — halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }
    let watchdog = Watchdog::new();

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsAdapter::default()
        }
    };
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            DeskConfig::default()
        }
    };

    if config.sensor == SensorKind::TimeOfFlight {
        if let Err(e) = hw_init::init_i2c() {
            warn!("I2C init failed ({}), height reads will error", e);
        }
    }

    // ── 3. Construct adapters ─────────────────────────────────
    let time_adapter = Esp32TimeAdapter::new();
    let mut hw = HardwareAdapter::new(
        HeightSensor::from_config(config.sensor),
        RelayDriver::new(),
    );
    let mut log_sink = LogEventSink::new();
    let mut paddle = PaddleInput::new();

    // ── Device identity ───────────────────────────────────────
    let mac = device_id::read_mac();
    let dev_id = device_id::device_id(&mac);
    let client_id = device_id::client_id(&mac);
    info!("Device ID: {} (client: {})", dev_id, client_id);

    // ── WiFi station adapter ──────────────────────────────────
    let mut wifi = WifiAdapter::new();
    match WIFI_SSID {
        Some(ssid) => {
            if let Err(e) = wifi.set_credentials(ssid, WIFI_PASS.unwrap_or("")) {
                warn!("WiFi credentials rejected: {}", e);
            } else if let Err(e) = wifi.connect() {
                warn!("WiFi connect failed ({}), reconnect loop will retry", e);
            }
        }
        None => warn!("No WiFi credentials compiled in — running offline"),
    }

    // ── MQTT adapter ──────────────────────────────────────────
    let mut mqtt = MqttAdapter::new(dev_id.as_str(), client_id.as_str(), &config);
    if wifi.is_connected() {
        match MQTT_BROKER {
            Some(broker) => {
                if let Err(e) = mqtt.connect(broker, MQTT_USER, MQTT_PASS) {
                    warn!("MQTT connect failed: {}", e);
                }
            }
            None => warn!("No MQTT broker compiled in — running without telemetry"),
        }
    }

    // ── 4. Construct app service ──────────────────────────────
    let mut app = AppService::new(config.clone());
    {
        let mut sink = FanoutSink {
            log: &mut log_sink,
            mqtt: &mut mqtt,
        };
        app.begin(&mut hw, &mut sink);
    }

    info!("System ready. Entering event loop.");

    // ── 5. Event loop ─────────────────────────────────────────
    let tick_ms = u64::from(config.control_loop_interval_ms);
    let telemetry_every_ticks =
        (u64::from(config.telemetry_interval_secs) * 1000 / tick_ms).max(1);
    let mut telemetry_counter: u64 = 0;

    loop {
        // Pace the loop. On FreeRTOS this yields to the idle task (which
        // also feeds the idle watchdog); on the host it drives the sim.
        std::thread::sleep(std::time::Duration::from_millis(tick_ms));

        let now_ms = time_adapter.uptime_ms();

        // Paddle edges are pushed BEFORE the control tick: the FIFO
        // drain then applies the manual override first.
        for edge in paddle.poll(now_ms as u32) {
            let event = match edge {
                PaddleEvent::UpPressed => Event::PaddleUpPressed,
                PaddleEvent::UpReleased => Event::PaddleUpReleased,
                PaddleEvent::DownPressed => Event::PaddleDownPressed,
                PaddleEvent::DownReleased => Event::PaddleDownReleased,
            };
            push_event(event);
        }
        push_event(Event::ControlTick);

        telemetry_counter += 1;
        if telemetry_counter >= telemetry_every_ticks {
            push_event(Event::TelemetryTick);
            telemetry_counter = 0;
        }

        // Process all pending events.
        events::drain_events(|event| {
            let manual = match event {
                Event::PaddleUpPressed => Some(ManualInput::UpPressed),
                Event::PaddleUpReleased => Some(ManualInput::UpReleased),
                Event::PaddleDownPressed => Some(ManualInput::DownPressed),
                Event::PaddleDownReleased => Some(ManualInput::DownReleased),
                _ => None,
            };
            if let Some(input) = manual {
                let mut sink = FanoutSink {
                    log: &mut log_sink,
                    mqtt: &mut mqtt,
                };
                app.handle_manual(input, now_ms, &mut hw, &mut sink);
                return;
            }

            match event {
                Event::ControlTick => {
                    let mut sink = FanoutSink {
                        log: &mut log_sink,
                        mqtt: &mut mqtt,
                    };
                    app.tick(now_ms, &mut hw, &mut sink);
                }

                Event::TelemetryTick => {
                    let telemetry = app.build_telemetry();
                    let mut sink = FanoutSink {
                        log: &mut log_sink,
                        mqtt: &mut mqtt,
                    };
                    sink.emit(&AppEvent::Telemetry(telemetry));
                }

                Event::CommandReceived => {
                    for command in mqtt.take_commands() {
                        let mut sink = FanoutSink {
                            log: &mut log_sink,
                            mqtt: &mut mqtt,
                        };
                        app.handle_command(command, now_ms, &mut hw, &mut sink);
                    }
                }

                Event::HaStatusOnline => {
                    info!("Home Assistant online — re-publishing discovery");
                    mqtt.publish_discovery();
                }

                _ => {}
            }
        });

        // Broker session upkeep (subscriptions + discovery once up).
        mqtt.poll_session();

        // WiFi reconnection poll (exponential backoff).
        wifi.poll(now_ms);

        // Config auto-save (debounced after last change).
        app.auto_save_if_needed(&nvs);

        // Feed watchdog on every iteration.
        watchdog.feed();
    }
}
