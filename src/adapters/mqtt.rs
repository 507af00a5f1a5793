//! MQTT adapter — Home-Assistant integration and command intake.
//!
//! Three responsibilities, all on the far side of the port boundary:
//!
//! 1. **Discovery** — retained Home-Assistant auto-discovery payloads for
//!    the target-height number entity, the height/preset sensors and the
//!    moving binary_sensor. Re-published whenever Home Assistant
//!    announces itself on `homeassistant/status` / `ha/status`.
//! 2. **State publishing** — implements [`EventSink`]; domain events map
//!    to retained state topics. Height updates are rate limited (token
//!    bucket for bursts plus a configured minimum spacing).
//! 3. **Command intake** — command-topic payloads are validated and
//!    parsed on the MQTT connection thread, queued in a mailbox, and a
//!    [`Event::CommandReceived`] wakes the main loop. Malformed or
//!    negative values never reach the application core.
//!
//! ## cfg gating
//!
//! On ESP-IDF the adapter drives a real `EspMqttClient` with a detached
//! connection thread. On host targets, publishes are recorded in-memory
//! and commands are injected directly — the parse/validate path is
//! identical and fully unit-tested.

use core::time::Duration;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use burster::Limiter;
use log::{info, warn};
use serde_json::json;

use crate::app::commands::AppCommand;
use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::config::{DeskConfig, MAX_PRESETS};
use crate::error::CommsError;
use crate::events::{push_event, Event};
use crate::motion::MotionState;

pub const HOMEASSISTANT_STATUS_TOPIC: &str = "homeassistant/status";
pub const HOMEASSISTANT_STATUS_TOPIC_ALT: &str = "ha/status";


// ───────────────────────────────────────────────────────────────
// Topic layout
// ───────────────────────────────────────────────────────────────

/// All topics derive from the MQTT client id: `smartdesk/<client-id>/…`.
#[derive(Debug, Clone)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(client_id: &str) -> Self {
        Self {
            base: format!("smartdesk/{}", client_id),
        }
    }

    pub fn availability(&self) -> String {
        format!("{}/availability", self.base)
    }
    pub fn height_state(&self) -> String {
        format!("{}/height/state", self.base)
    }
    pub fn target_state(&self) -> String {
        format!("{}/target/state", self.base)
    }
    pub fn preset_state(&self) -> String {
        format!("{}/preset/state", self.base)
    }
    pub fn motion_state(&self) -> String {
        format!("{}/motion/state", self.base)
    }
    pub fn target_command(&self) -> String {
        format!("{}/target/set", self.base)
    }
    pub fn stop_command(&self) -> String {
        format!("{}/stop", self.base)
    }
    pub fn preset_recall_command(&self) -> String {
        format!("{}/preset/recall", self.base)
    }
    pub fn preset_save_command(&self) -> String {
        format!("{}/preset/save", self.base)
    }

    /// Every topic the adapter subscribes to.
    pub fn subscriptions(&self) -> [String; 6] {
        [
            self.target_command(),
            self.stop_command(),
            self.preset_recall_command(),
            self.preset_save_command(),
            String::from(HOMEASSISTANT_STATUS_TOPIC),
            String::from(HOMEASSISTANT_STATUS_TOPIC_ALT),
        ]
    }
}

// ───────────────────────────────────────────────────────────────
// Inbound parsing (shared by target and simulation)
// ───────────────────────────────────────────────────────────────

/// A classified inbound MQTT message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(AppCommand),
    /// Home Assistant came online; discovery must be re-published.
    HaOnline,
}

/// Validate and classify one inbound message. This is the boundary
/// filter the core relies on: whatever passes here is well-formed.
pub fn parse_inbound(topics: &Topics, topic: &str, payload: &str) -> Option<Inbound> {
    if topic == HOMEASSISTANT_STATUS_TOPIC || topic == HOMEASSISTANT_STATUS_TOPIC_ALT {
        return (payload.trim() == "online").then_some(Inbound::HaOnline);
    }

    if topic == topics.target_command() {
        let cm: f64 = payload.trim().parse().ok()?;
        if !cm.is_finite() || cm <= 0.0 {
            warn!("MQTT: rejected target payload '{}'", payload);
            return None;
        }
        return Some(Inbound::Command(AppCommand::SetTarget(cm)));
    }

    if topic == topics.stop_command() {
        return Some(Inbound::Command(AppCommand::Stop));
    }

    let parse_slot = |payload: &str| -> Option<u8> {
        let slot: u8 = payload.trim().parse().ok()?;
        // Slots are 1-based on the wire, 0-based internally.
        (1..=MAX_PRESETS as u8).contains(&slot).then(|| slot - 1)
    };

    if topic == topics.preset_recall_command() {
        return match parse_slot(payload) {
            Some(slot) => Some(Inbound::Command(AppCommand::RecallPreset(slot))),
            None => {
                warn!("MQTT: rejected preset recall payload '{}'", payload);
                None
            }
        };
    }

    if topic == topics.preset_save_command() {
        return match parse_slot(payload) {
            Some(slot) => Some(Inbound::Command(AppCommand::SavePreset(slot))),
            None => {
                warn!("MQTT: rejected preset save payload '{}'", payload);
                None
            }
        };
    }

    None
}

// ───────────────────────────────────────────────────────────────
// Adapter
// ───────────────────────────────────────────────────────────────

pub struct MqttAdapter {
    topics: Topics,
    device_id: String,
    client_id: String,
    /// Bounds baked into the discovery payload for the number entity.
    min_height_cm: f64,
    max_height_cm: f64,
    min_height_interval: Duration,

    mailbox: Arc<Mutex<VecDeque<Inbound>>>,
    connected: Arc<AtomicBool>,
    subscribed: bool,

    publish_limiter: burster::TokenBucket<fn() -> Duration>,
    last_height_pub: Option<Duration>,

    #[cfg(target_os = "espidf")]
    client: Option<esp_idf_svc::mqtt::client::EspMqttClient<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim_published: Vec<(String, String)>,
}

impl MqttAdapter {
    pub fn new(device_id: &str, client_id: &str, config: &DeskConfig) -> Self {
        Self {
            topics: Topics::new(client_id),
            device_id: String::from(device_id),
            client_id: String::from(client_id),
            min_height_cm: config.min_height_cm,
            max_height_cm: config.max_height_cm,
            min_height_interval: Duration::from_millis(u64::from(
                config.height_publish_min_interval_ms,
            )),
            mailbox: Arc::new(Mutex::new(VecDeque::new())),
            connected: Arc::new(AtomicBool::new(false)),
            subscribed: false,
            publish_limiter: burster::TokenBucket::new_with_time_provider(
                5,
                5, // 5 tokens per second, 5 burst capacity (state topics)
                platform_now as fn() -> Duration,
            ),
            last_height_pub: None,
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(not(target_os = "espidf"))]
            sim_published: Vec::new(),
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    // ── Connection ────────────────────────────────────────────

    /// Create the client and start the connection thread.
    #[cfg(target_os = "espidf")]
    pub fn connect(
        &mut self,
        broker_url: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), CommsError> {
        use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration};

        let mqtt_config = MqttClientConfiguration {
            client_id: Some(self.client_id.as_str()),
            username,
            password,
            keep_alive_interval: Some(core::time::Duration::from_secs(60)),
            ..Default::default()
        };

        info!("MQTT: connecting to {}", broker_url);
        let (client, mut connection) = EspMqttClient::new(broker_url, &mqtt_config)
            .map_err(|_| CommsError::MqttConnectFailed)?;

        let topics = self.topics.clone();
        let mailbox = Arc::clone(&self.mailbox);
        let connected = Arc::clone(&self.connected);

        // Connection thread: classifies inbound traffic and wakes the
        // main loop through the event queue. It never touches the
        // controller directly.
        std::thread::spawn(move || {
            while let Ok(event) = connection.next() {
                match event.payload() {
                    EventPayload::Connected(_) => {
                        info!("MQTT: connected");
                        connected.store(true, Ordering::Release);
                    }
                    EventPayload::Disconnected => {
                        warn!("MQTT: disconnected, client will auto-reconnect");
                        connected.store(false, Ordering::Release);
                    }
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        ..
                    } => {
                        let payload = core::str::from_utf8(data).unwrap_or("");
                        if let Some(inbound) = parse_inbound(&topics, topic, payload) {
                            let event = match &inbound {
                                Inbound::HaOnline => Event::HaStatusOnline,
                                Inbound::Command(_) => Event::CommandReceived,
                            };
                            if let Ok(mut q) = mailbox.lock() {
                                q.push_back(inbound);
                            }
                            push_event(event);
                        }
                    }
                    EventPayload::Error(e) => warn!("MQTT: error {:?}", e),
                    _ => {}
                }
            }
            warn!("MQTT: connection loop ended");
        });

        self.client = Some(client);
        Ok(())
    }

    /// Host simulation: mark the virtual broker connected.
    #[cfg(not(target_os = "espidf"))]
    pub fn connect(
        &mut self,
        broker_url: &str,
        _username: Option<&str>,
        _password: Option<&str>,
    ) -> Result<(), CommsError> {
        info!("MQTT(sim): connected to {} as {}", broker_url, self.client_id);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Once the broker session is up, subscribe to the command topics and
    /// announce the device. Idempotent; call from the main loop.
    pub fn poll_session(&mut self) {
        if !self.is_connected() || self.subscribed {
            return;
        }
        for topic in self.topics.subscriptions() {
            self.subscribe(&topic);
        }
        self.publish_availability();
        self.publish_discovery();
        self.subscribed = true;
    }

    /// Drain commands parsed by the connection thread since last call.
    pub fn take_commands(&mut self) -> Vec<AppCommand> {
        let mut commands = Vec::new();
        if let Ok(mut q) = self.mailbox.lock() {
            while let Some(inbound) = q.pop_front() {
                match inbound {
                    Inbound::Command(cmd) => commands.push(cmd),
                    Inbound::HaOnline => {} // handled via HaStatusOnline event
                }
            }
        }
        commands
    }

    /// Inject an inbound message on the host (tests / simulation).
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_inject(&mut self, topic: &str, payload: &str) {
        if let Some(inbound) = parse_inbound(&self.topics, topic, payload) {
            let event = match &inbound {
                Inbound::HaOnline => Event::HaStatusOnline,
                Inbound::Command(_) => Event::CommandReceived,
            };
            if let Ok(mut q) = self.mailbox.lock() {
                q.push_back(inbound);
            }
            push_event(event);
        }
    }

    /// Publishes recorded on the host, for assertions.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_published(&self) -> &[(String, String)] {
        &self.sim_published
    }

    // ── Discovery ─────────────────────────────────────────────

    /// Publish the retained Home-Assistant discovery payloads, under the
    /// standard prefix and the site-local alternative.
    pub fn publish_discovery(&mut self) {
        let device = json!({
            "identifiers": [self.device_id],
            "name": "Smart Desk",
            "model": "Smart Desk Control OMT",
            "manufacturer": "maker_pt",
        });
        let availability = self.topics.availability();

        let target = json!({
            "name": "Target Height",
            "unique_id": format!("{}_target", self.device_id),
            "command_topic": self.topics.target_command(),
            "state_topic": self.topics.target_state(),
            "min": self.min_height_cm,
            "max": self.max_height_cm,
            "step": 1,
            "unit_of_measurement": "cm",
            "icon": "mdi:desk",
            "availability_topic": availability,
            "device": device,
        });
        let height = json!({
            "name": "Desk Height",
            "unique_id": format!("{}_height", self.device_id),
            "state_topic": self.topics.height_state(),
            "unit_of_measurement": "cm",
            "icon": "mdi:arrow-expand-vertical",
            "availability_topic": availability,
            "device": device,
        });
        let preset = json!({
            "name": "Active Preset",
            "unique_id": format!("{}_preset", self.device_id),
            "state_topic": self.topics.preset_state(),
            "icon": "mdi:bookmark-outline",
            "availability_topic": availability,
            "device": device,
        });
        let moving = json!({
            "name": "Desk Moving",
            "unique_id": format!("{}_moving", self.device_id),
            "state_topic": self.topics.motion_state(),
            "payload_on": "moving",
            "payload_off": "stopped",
            "device_class": "moving",
            "availability_topic": availability,
            "device": device,
        });

        let entities = [
            ("number", "target", target),
            ("sensor", "height", height),
            ("sensor", "preset", preset),
            ("binary_sensor", "moving", moving),
        ];

        for (component, suffix, payload) in entities {
            let body = payload.to_string();
            for prefix in ["homeassistant", "ha"] {
                let topic = format!(
                    "{}/{}/{}_{}/config",
                    prefix, component, self.device_id, suffix
                );
                self.publish(&topic, &body, true);
            }
        }
        info!("MQTT: discovery published");
    }

    fn publish_availability(&mut self) {
        self.publish(&self.topics.availability(), "online", true);
    }

    // ── Publishing ────────────────────────────────────────────

    /// Burst-guarded publish for state topics. Discovery and
    /// availability go through [`publish`](Self::publish) directly —
    /// they fire in a fixed-size batch once per session, not per tick.
    fn publish_limited(&mut self, topic: &str, payload: &str, retain: bool) {
        if self.publish_limiter.try_consume(1).is_err() {
            warn!("MQTT: publish to {} dropped (rate limit)", topic);
            return;
        }
        self.publish(topic, payload, retain);
    }

    fn publish(&mut self, topic: &str, payload: &str, retain: bool) {
        #[cfg(target_os = "espidf")]
        {
            use esp_idf_svc::mqtt::client::QoS;
            if let Some(client) = self.client.as_mut() {
                if let Err(e) =
                    client.publish(topic, QoS::AtLeastOnce, retain, payload.as_bytes())
                {
                    warn!("MQTT: publish to {} failed: {:?}", topic, e);
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let _ = retain;
            self.sim_published
                .push((String::from(topic), String::from(payload)));
        }
    }

    fn subscribe(&mut self, topic: &str) {
        #[cfg(target_os = "espidf")]
        {
            use esp_idf_svc::mqtt::client::QoS;
            if let Some(client) = self.client.as_mut() {
                if let Err(e) = client.subscribe(topic, QoS::AtLeastOnce) {
                    warn!("MQTT: subscribe to {} failed: {:?}", topic, e);
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        info!("MQTT(sim): subscribed to {}", topic);
    }

    fn publish_height(&mut self, height_cm: f64) {
        // Height moves continuously while the desk runs; keep the
        // configured minimum spacing between publishes.
        let now = platform_now();
        if let Some(last) = self.last_height_pub {
            if now.saturating_sub(last) < self.min_height_interval {
                return;
            }
        }
        self.last_height_pub = Some(now);
        let payload = format_cm(height_cm);
        self.publish_limited(&self.topics.height_state(), &payload, true);
    }

    fn publish_motion(&mut self, state: MotionState) {
        let payload = match state {
            MotionState::Stopped => "stopped",
            MotionState::MovingUp | MotionState::MovingDown => "moving",
        };
        self.publish_limited(&self.topics.motion_state(), payload, true);
    }
}

fn format_cm(cm: f64) -> String {
    format!("{:.1}", cm)
}

// ───────────────────────────────────────────────────────────────
// EventSink — domain events → state topics
// ───────────────────────────────────────────────────────────────

impl EventSink for MqttAdapter {
    fn emit(&mut self, event: &AppEvent) {
        if !self.is_connected() {
            return;
        }

        match event {
            AppEvent::Telemetry(t) => {
                if let Some(height) = t.height_cm {
                    self.publish_height(height);
                }
                self.publish_motion(t.motion);
                let preset = match t.preset {
                    Some(slot) => format!("{}", slot + 1),
                    None => String::from("none"),
                };
                self.publish_limited(&self.topics.preset_state(), &preset, true);
            }
            AppEvent::MotionChanged { to, .. } => {
                self.publish_motion(*to);
            }
            AppEvent::TargetSet { target_cm } => {
                let payload = format_cm(*target_cm);
                self.publish_limited(&self.topics.target_state(), &payload, true);
            }
            AppEvent::TargetReached { height_cm, .. } => {
                // Arrival is worth an immediate height update regardless
                // of the spacing gate.
                self.last_height_pub = None;
                self.publish_height(*height_cm);
            }
            AppEvent::PresetChanged(preset) => {
                let payload = match preset {
                    Some(slot) => format!("{}", slot + 1),
                    None => String::from("none"),
                };
                self.publish_limited(&self.topics.preset_state(), &payload, true);
            }
            // Serial-only events; nothing to mirror on the network.
            AppEvent::ManualOverride
            | AppEvent::PresetSaved { .. }
            | AppEvent::SensorFault(_)
            | AppEvent::Started => {}
        }
    }
}

// ── Platform time for the rate limiter ────────────────────────

#[cfg(target_os = "espidf")]
fn platform_now() -> Duration {
    let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
    Duration::from_micros(us as u64)
}

#[cfg(not(target_os = "espidf"))]
fn platform_now() -> Duration {
    use std::time::Instant;
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    START.get_or_init(Instant::now).elapsed()
}

// ───────────────────────────────────────────────────────────────
// Tests (host only)
// ───────────────────────────────────────────────────────────────

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    fn topics() -> Topics {
        Topics::new("smartdesk-aabbcc")
    }

    #[test]
    fn topic_layout_derives_from_client_id() {
        let t = topics();
        assert_eq!(t.height_state(), "smartdesk/smartdesk-aabbcc/height/state");
        assert_eq!(t.target_command(), "smartdesk/smartdesk-aabbcc/target/set");
    }

    #[test]
    fn parses_valid_target_command() {
        let t = topics();
        assert_eq!(
            parse_inbound(&t, &t.target_command(), "95"),
            Some(Inbound::Command(AppCommand::SetTarget(95.0))),
        );
    }

    #[test]
    fn rejects_malformed_target_payloads() {
        let t = topics();
        assert_eq!(parse_inbound(&t, &t.target_command(), "up please"), None);
        assert_eq!(parse_inbound(&t, &t.target_command(), "-40"), None);
        assert_eq!(parse_inbound(&t, &t.target_command(), "NaN"), None);
        assert_eq!(parse_inbound(&t, &t.target_command(), "inf"), None);
        assert_eq!(parse_inbound(&t, &t.target_command(), ""), None);
    }

    #[test]
    fn parses_preset_commands_one_based() {
        let t = topics();
        assert_eq!(
            parse_inbound(&t, &t.preset_recall_command(), "1"),
            Some(Inbound::Command(AppCommand::RecallPreset(0)))
        );
        assert_eq!(
            parse_inbound(&t, &t.preset_save_command(), "3"),
            Some(Inbound::Command(AppCommand::SavePreset(2)))
        );
        assert_eq!(parse_inbound(&t, &t.preset_recall_command(), "0"), None);
        assert_eq!(parse_inbound(&t, &t.preset_recall_command(), "4"), None);
    }

    #[test]
    fn ha_status_online_detected_on_both_topics() {
        let t = topics();
        assert_eq!(
            parse_inbound(&t, HOMEASSISTANT_STATUS_TOPIC, "online"),
            Some(Inbound::HaOnline)
        );
        assert_eq!(
            parse_inbound(&t, HOMEASSISTANT_STATUS_TOPIC_ALT, "online"),
            Some(Inbound::HaOnline)
        );
        assert_eq!(parse_inbound(&t, HOMEASSISTANT_STATUS_TOPIC, "offline"), None);
    }

    #[test]
    fn unknown_topic_ignored() {
        let t = topics();
        assert_eq!(parse_inbound(&t, "some/other/topic", "80"), None);
    }

    #[test]
    fn discovery_is_valid_json_with_device_block() {
        let mut mqtt = MqttAdapter::new("SD-AABBCC", "smartdesk-aabbcc", &DeskConfig::default());
        mqtt.connect("mqtt://broker.local:1883", None, None).unwrap();
        mqtt.publish_discovery();

        let published = mqtt.sim_published();
        // 4 entities × 2 prefixes.
        assert_eq!(published.len(), 8);
        for (topic, payload) in published {
            assert!(topic.ends_with("/config"), "topic {topic}");
            let value: serde_json::Value = serde_json::from_str(payload).unwrap();
            assert_eq!(value["device"]["name"], "Smart Desk");
            assert!(value["availability_topic"].is_string());
        }
        // The number entity carries the travel bounds.
        let (_, number_payload) = &published[0];
        let value: serde_json::Value = serde_json::from_str(number_payload).unwrap();
        assert_eq!(value["min"], DeskConfig::default().min_height_cm);
        assert_eq!(value["max"], DeskConfig::default().max_height_cm);
    }

    #[test]
    fn injected_command_lands_in_mailbox() {
        // sim_inject pushes to the global event queue as a side effect.
        let _guard = crate::events::QUEUE_TEST_LOCK.lock().unwrap();

        let mut mqtt = MqttAdapter::new("SD-AABBCC", "smartdesk-aabbcc", &DeskConfig::default());
        mqtt.connect("mqtt://broker.local:1883", None, None).unwrap();

        let target_topic = mqtt.topics().target_command();
        mqtt.sim_inject(&target_topic, "101.5");
        mqtt.sim_inject(&target_topic, "garbage");

        let commands = mqtt.take_commands();
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], AppCommand::SetTarget(cm) if (cm - 101.5).abs() < 1e-9));
        assert!(mqtt.take_commands().is_empty(), "mailbox drained");

        // Leave the queue clean for other tests.
        crate::events::drain_events(|_| {});
    }

    #[test]
    fn height_publishes_respect_min_spacing() {
        let mut mqtt = MqttAdapter::new("SD-AABBCC", "smartdesk-aabbcc", &DeskConfig::default());
        mqtt.connect("mqtt://broker.local:1883", None, None).unwrap();

        mqtt.publish_height(80.0);
        mqtt.publish_height(80.5); // inside the 2 s window, dropped
        let heights: Vec<_> = mqtt
            .sim_published()
            .iter()
            .filter(|(t, _)| t.ends_with("/height/state"))
            .collect();
        assert_eq!(heights.len(), 1);
        assert_eq!(heights[0].1, "80.0");
    }
}
