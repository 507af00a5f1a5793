//! Application service — the hexagonal core.
//!
//! [`AppService`] owns the motion controller, the automatic-mode flag and
//! the preset tracker. It exposes a clean, hardware-agnostic API. All
//! I/O flows through port traits injected at call sites, making the
//! entire service testable with mock adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                 │          AppService          │
//!   RelayPort ◀── │  Motion · Seek · Presets     │
//!                 └──────────────────────────────┘
//! ```
//!
//! Arbitration rule: a manual paddle edge always wins. The main loop
//! delivers paddle edges via [`handle_manual`](AppService::handle_manual)
//! before the control tick of the same iteration, and `handle_manual`
//! clears automatic mode before issuing any motion command.

use log::{info, warn};

use crate::config::{DeskConfig, MAX_PRESETS};
use crate::motion::preset::{match_preset, PresetTracker};
use crate::motion::seek::{seek, SeekOutcome};
use crate::motion::DeskMotionController;

use super::commands::AppCommand;
use super::events::{AppEvent, TelemetryData};
use super::ports::{ConfigPort, EventSink, RelayPort, SensorPort};

/// Debounce window for config auto-save, in ticks (about 5 s at the
/// default 100 ms control interval).
const AUTO_SAVE_DEBOUNCE_TICKS: u64 = 50;

/// A debounced state change of the manual paddle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualInput {
    UpPressed,
    UpReleased,
    DownPressed,
    DownReleased,
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    desk: DeskMotionController,
    presets: PresetTracker,
    config: DeskConfig,

    /// Automatic-mode flag: while set, each tick runs one seek iteration.
    automatic: bool,
    /// Target height while automatic mode is engaged (already clamped).
    target_cm: Option<f64>,
    /// Last valid sensor reading.
    last_height_cm: Option<f64>,
    /// False while the sensor is failing; gates fault-event emission to
    /// the first failure of a streak.
    sensor_healthy: bool,

    tick_count: u64,
    config_dirty: bool,
    dirty_since_tick: u64,
    save_requested: bool,
}

impl AppService {
    /// Construct the service from configuration.
    ///
    /// Does **not** touch hardware — call [`begin`](Self::begin) next.
    pub fn new(config: DeskConfig) -> Self {
        let desk = DeskMotionController::new(&config);
        Self {
            desk,
            presets: PresetTracker::new(),
            config,
            automatic: false,
            target_cm: None,
            last_height_cm: None,
            sensor_healthy: true,
            tick_count: 0,
            config_dirty: false,
            dirty_since_tick: 0,
            save_requested: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Initialise the relays to a known stopped state.
    pub fn begin(&mut self, hw: &mut impl RelayPort, sink: &mut impl EventSink) {
        self.desk.begin(hw);
        sink.emit(&AppEvent::Started);
        info!("AppService started ({:?})", self.desk.state());
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control cycle: read the sensor, advance automatic seeking,
    /// classify presets.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`RelayPort`] — this avoids a double mutable borrow while keeping
    /// the port boundary explicit.
    pub fn tick(
        &mut self,
        now_ms: u64,
        hw: &mut (impl SensorPort + RelayPort),
        sink: &mut impl EventSink,
    ) {
        self.tick_count += 1;
        let prev_state = self.desk.state();

        // 1. Read the height sensor via SensorPort.
        let height = match hw.read_height_cm() {
            Ok(cm) => {
                self.sensor_healthy = true;
                self.last_height_cm = Some(cm);
                Some(cm)
            }
            Err(e) => {
                warn!("Height read failed ({e}), skipping control decision");
                if self.sensor_healthy {
                    self.sensor_healthy = false;
                    sink.emit(&AppEvent::SensorFault(e));
                }
                None
            }
        };

        // 2. Automatic seeking, gated on a fresh valid reading.
        if self.automatic {
            if let (Some(current), Some(target)) = (height, self.target_cm) {
                if seek(&mut self.desk, hw, now_ms, current, target) == SeekOutcome::Reached {
                    self.automatic = false;
                    self.target_cm = None;
                    sink.emit(&AppEvent::TargetReached {
                        target_cm: target,
                        height_cm: current,
                    });
                }
            }
        }

        // 3. Preset classification for telemetry.
        if let Some(current) = height {
            let matched = match_preset(current, &self.config.presets, self.desk.target_accuracy_cm());
            if let Some(change) = self.presets.update(matched) {
                sink.emit(&AppEvent::PresetChanged(change));
            }
        }

        self.emit_if_motion_changed(prev_state, sink);
    }

    // ── Manual input ──────────────────────────────────────────

    /// Apply a debounced paddle edge.
    ///
    /// Automatic mode is cancelled before any motion command is issued,
    /// so an override in the same tick as an active seek always wins.
    pub fn handle_manual(
        &mut self,
        input: ManualInput,
        now_ms: u64,
        hw: &mut impl RelayPort,
        sink: &mut impl EventSink,
    ) {
        if self.automatic {
            self.automatic = false;
            self.target_cm = None;
            sink.emit(&AppEvent::ManualOverride);
            info!("Manual input overrides automatic seeking");
        }

        let prev_state = self.desk.state();
        match input {
            ManualInput::UpPressed => self.desk.move_up(now_ms, hw),
            ManualInput::DownPressed => self.desk.move_down(now_ms, hw),
            ManualInput::UpReleased | ManualInput::DownReleased => self.desk.stop(now_ms, hw),
        }
        self.emit_if_motion_changed(prev_state, sink);
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command (from MQTT, serial, etc.).
    pub fn handle_command(
        &mut self,
        command: AppCommand,
        now_ms: u64,
        hw: &mut impl RelayPort,
        sink: &mut impl EventSink,
    ) {
        match command {
            AppCommand::SetTarget(requested_cm) => {
                let target = self.desk.clamp_target(requested_cm);
                if (target - requested_cm).abs() > f64::EPSILON {
                    warn!(
                        "Target {:.1}cm outside bounds, clamped to {:.1}cm",
                        requested_cm, target
                    );
                }
                info!("New target height: {:.2}cm", target);
                self.target_cm = Some(target);
                self.automatic = true;
                sink.emit(&AppEvent::TargetSet { target_cm: target });
            }

            AppCommand::Stop => {
                let prev_state = self.desk.state();
                self.automatic = false;
                self.target_cm = None;
                self.desk.stop(now_ms, hw);
                self.emit_if_motion_changed(prev_state, sink);
            }

            AppCommand::RecallPreset(slot) => {
                match self.config.presets.get(slot as usize).copied() {
                    Some(height) => {
                        info!("Recall preset {}: {:.1}cm", u32::from(slot) + 1, height);
                        self.handle_command(AppCommand::SetTarget(height), now_ms, hw, sink);
                    }
                    None => warn!("Recall of empty preset slot {}", u32::from(slot) + 1),
                }
            }

            AppCommand::SavePreset(slot) => self.save_preset(slot as usize, sink),

            AppCommand::UpdateConfig(new_config) => {
                self.config = new_config;
                self.desk.apply_config(&self.config);
                self.mark_config_dirty();
                info!("Config updated (will auto-save)");
            }

            AppCommand::SaveConfig => {
                self.mark_config_dirty();
                self.save_requested = true;
            }
        }
    }

    fn save_preset(&mut self, slot: usize, sink: &mut impl EventSink) {
        let Some(height) = self.last_height_cm else {
            warn!("Cannot save preset {}: no height reading yet", slot + 1);
            return;
        };
        if slot >= MAX_PRESETS {
            warn!("Preset slot {} out of range", slot + 1);
            return;
        }

        if slot < self.config.presets.len() {
            self.config.presets[slot] = height;
        } else if self.config.presets.push(height).is_err() {
            // len() < MAX_PRESETS here, so push only fails on a gap.
            warn!("Preset slot {} would leave a gap, not saved", slot + 1);
            return;
        }

        self.mark_config_dirty();
        info!("Preset {} saved: {:.1}cm", slot + 1, height);
        sink.emit(&AppEvent::PresetSaved {
            slot,
            height_cm: height,
        });
    }

    // ── Introspection ─────────────────────────────────────────

    /// Build a telemetry snapshot of the current system state.
    pub fn build_telemetry(&self) -> TelemetryData {
        TelemetryData {
            motion: self.desk.state(),
            height_cm: self.last_height_cm,
            target_cm: self.target_cm,
            automatic: self.automatic,
            preset: self.presets.current(),
        }
    }

    pub fn motion_state(&self) -> crate::motion::MotionState {
        self.desk.state()
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    pub fn target_cm(&self) -> Option<f64> {
        self.target_cm
    }

    pub fn last_height_cm(&self) -> Option<f64> {
        self.last_height_cm
    }

    /// Snapshot of the active configuration.
    pub fn current_config(&self) -> DeskConfig {
        self.config.clone()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    // ── Config persistence ────────────────────────────────────

    /// Note that the in-memory config diverged from NVS. The actual save
    /// happens on a later [`auto_save_if_needed`](Self::auto_save_if_needed)
    /// once the debounce window passes (coalesces bursts of changes).
    pub fn mark_config_dirty(&mut self) {
        if !self.config_dirty {
            self.config_dirty = true;
            self.dirty_since_tick = self.tick_count;
        }
    }

    /// Persist the config if it is dirty and the debounce window elapsed
    /// (or an explicit save was requested). Returns `true` on save.
    pub fn auto_save_if_needed(&mut self, storage: &impl ConfigPort) -> bool {
        if !self.config_dirty {
            return false;
        }
        let debounced = self.tick_count.saturating_sub(self.dirty_since_tick)
            >= AUTO_SAVE_DEBOUNCE_TICKS;
        if !debounced && !self.save_requested {
            return false;
        }

        match storage.save(&self.config) {
            Ok(()) => {
                self.config_dirty = false;
                self.save_requested = false;
                info!("Config auto-saved");
                true
            }
            Err(e) => {
                warn!("Config auto-save failed: {e} (will retry)");
                false
            }
        }
    }

    /// Persist unconditionally if dirty — used on shutdown paths.
    pub fn force_save_if_dirty(&mut self, storage: &impl ConfigPort) {
        if self.config_dirty {
            match storage.save(&self.config) {
                Ok(()) => {
                    self.config_dirty = false;
                    self.save_requested = false;
                }
                Err(e) => warn!("Forced config save failed: {e}"),
            }
        }
    }

    pub fn is_config_dirty(&self) -> bool {
        self.config_dirty
    }

    // ── Internal ──────────────────────────────────────────────

    fn emit_if_motion_changed(
        &self,
        prev_state: crate::motion::MotionState,
        sink: &mut impl EventSink,
    ) {
        let new_state = self.desk.state();
        if new_state != prev_state {
            sink.emit(&AppEvent::MotionChanged {
                from: prev_state,
                to: new_state,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use crate::motion::MotionState;

    // ── Test doubles ──────────────────────────────────────────

    struct FakeHw {
        readings: Vec<Result<f64, SensorError>>,
        next: usize,
        up: bool,
        down: bool,
    }

    impl FakeHw {
        fn with_readings(readings: Vec<Result<f64, SensorError>>) -> Self {
            Self {
                readings,
                next: 0,
                up: false,
                down: false,
            }
        }
    }

    impl SensorPort for FakeHw {
        fn read_height_cm(&mut self) -> Result<f64, SensorError> {
            let r = self.readings[self.next.min(self.readings.len() - 1)];
            self.next += 1;
            r
        }
    }

    impl RelayPort for FakeHw {
        fn set_up(&mut self, active: bool) {
            self.up = active;
        }
        fn set_down(&mut self, active: bool) {
            self.down = active;
        }
        fn all_off(&mut self) {
            self.up = false;
            self.down = false;
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        events: Vec<AppEvent>,
    }

    impl EventSink for CollectingSink {
        fn emit(&mut self, event: &AppEvent) {
            self.events.push(event.clone());
        }
    }

    fn service() -> AppService {
        AppService::new(DeskConfig::default())
    }

    // ── Tests ─────────────────────────────────────────────────

    #[test]
    fn seek_converges_over_sensor_sequence() {
        // target=80: four readings climb outside the deadband, then
        // 80.5 lands inside the 5 cm radius and motion stops.
        let mut app = service();
        let mut hw = FakeHw::with_readings(vec![
            Ok(60.0),
            Ok(65.0),
            Ok(70.0),
            Ok(74.0),
            Ok(80.5),
        ]);
        let mut sink = CollectingSink::default();

        app.begin(&mut hw, &mut sink);
        app.handle_command(AppCommand::SetTarget(80.0), 0, &mut hw, &mut sink);

        for i in 0..4u64 {
            app.tick(i * 100, &mut hw, &mut sink);
            assert_eq!(app.motion_state(), MotionState::MovingUp, "tick {i}");
            assert!(hw.up && !hw.down);
        }

        app.tick(400, &mut hw, &mut sink);
        assert_eq!(app.motion_state(), MotionState::Stopped);
        assert!(!hw.up && !hw.down);
        assert!(!app.is_automatic());
        assert!(sink
            .events
            .iter()
            .any(|e| matches!(e, AppEvent::TargetReached { target_cm, height_cm }
                if (*target_cm - 80.0).abs() < 1e-9 && (*height_cm - 80.5).abs() < 1e-9)));
    }

    #[test]
    fn manual_edge_cancels_automatic_before_moving() {
        let mut app = service();
        let mut hw = FakeHw::with_readings(vec![Ok(60.0)]);
        let mut sink = CollectingSink::default();

        app.begin(&mut hw, &mut sink);
        app.handle_command(AppCommand::SetTarget(100.0), 0, &mut hw, &mut sink);
        app.tick(0, &mut hw, &mut sink);
        assert!(app.is_automatic());
        assert_eq!(app.motion_state(), MotionState::MovingUp);

        // Paddle down mid-seek: automatic cleared, reversal stops first.
        app.handle_manual(ManualInput::DownPressed, 100, &mut hw, &mut sink);
        assert!(!app.is_automatic());
        assert_eq!(app.target_cm(), None);
        assert_eq!(app.motion_state(), MotionState::Stopped);
        assert!(sink
            .events
            .iter()
            .any(|e| matches!(e, AppEvent::ManualOverride)));

        // With automatic mode off, the next tick issues no motion command.
        app.tick(200, &mut hw, &mut sink);
        assert_eq!(app.motion_state(), MotionState::Stopped);
    }

    #[test]
    fn paddle_press_and_release() {
        let mut app = service();
        let mut hw = FakeHw::with_readings(vec![Ok(90.0)]);
        let mut sink = CollectingSink::default();
        app.begin(&mut hw, &mut sink);

        app.handle_manual(ManualInput::UpPressed, 0, &mut hw, &mut sink);
        assert_eq!(app.motion_state(), MotionState::MovingUp);

        app.handle_manual(ManualInput::UpReleased, 1500, &mut hw, &mut sink);
        assert_eq!(app.motion_state(), MotionState::Stopped);
        assert!(!hw.up && !hw.down);
    }

    #[test]
    fn sensor_failure_skips_control_decision() {
        let mut app = service();
        let mut hw = FakeHw::with_readings(vec![
            Ok(60.0),
            Err(SensorError::EchoTimeout),
            Err(SensorError::EchoTimeout),
            Ok(70.0),
        ]);
        let mut sink = CollectingSink::default();

        app.begin(&mut hw, &mut sink);
        app.handle_command(AppCommand::SetTarget(100.0), 0, &mut hw, &mut sink);

        app.tick(0, &mut hw, &mut sink);
        assert_eq!(app.motion_state(), MotionState::MovingUp);

        // Failed reads: no new command, relays untouched, auto still armed.
        app.tick(100, &mut hw, &mut sink);
        app.tick(200, &mut hw, &mut sink);
        assert_eq!(app.motion_state(), MotionState::MovingUp);
        assert!(app.is_automatic());
        assert_eq!(app.last_height_cm(), Some(60.0));

        // One fault event for the streak, not one per failed tick.
        let faults = sink
            .events
            .iter()
            .filter(|e| matches!(e, AppEvent::SensorFault(_)))
            .count();
        assert_eq!(faults, 1);

        // Recovery resumes seeking.
        app.tick(300, &mut hw, &mut sink);
        assert_eq!(app.last_height_cm(), Some(70.0));
    }

    #[test]
    fn target_is_clamped_to_bounds() {
        let mut app = service();
        let mut hw = FakeHw::with_readings(vec![Ok(90.0)]);
        let mut sink = CollectingSink::default();
        app.begin(&mut hw, &mut sink);

        let max = DeskConfig::default().max_height_cm;
        app.handle_command(AppCommand::SetTarget(500.0), 0, &mut hw, &mut sink);
        assert_eq!(app.target_cm(), Some(max));
    }

    #[test]
    fn preset_recall_sets_target() {
        let mut app = service();
        let mut hw = FakeHw::with_readings(vec![Ok(60.0)]);
        let mut sink = CollectingSink::default();
        app.begin(&mut hw, &mut sink);

        let expected = DeskConfig::default().presets[1];
        app.handle_command(AppCommand::RecallPreset(1), 0, &mut hw, &mut sink);
        assert!(app.is_automatic());
        assert_eq!(app.target_cm(), Some(expected));
    }

    #[test]
    fn preset_save_uses_last_height() {
        let mut app = service();
        let mut hw = FakeHw::with_readings(vec![Ok(87.0)]);
        let mut sink = CollectingSink::default();
        app.begin(&mut hw, &mut sink);
        app.tick(0, &mut hw, &mut sink);

        app.handle_command(AppCommand::SavePreset(0), 100, &mut hw, &mut sink);
        assert!((app.current_config().presets[0] - 87.0).abs() < 1e-9);
        assert!(app.is_config_dirty());
        assert!(sink.events.iter().any(|e| matches!(
            e,
            AppEvent::PresetSaved { slot: 0, height_cm } if (*height_cm - 87.0).abs() < 1e-9
        )));
    }

    #[test]
    fn preset_change_emitted_once_per_transition() {
        let mut app = service();
        // Default presets include 100.0; accuracy 5.
        let mut hw = FakeHw::with_readings(vec![Ok(80.0), Ok(98.0), Ok(99.0), Ok(80.0)]);
        let mut sink = CollectingSink::default();
        app.begin(&mut hw, &mut sink);

        for i in 0..4u64 {
            app.tick(i * 100, &mut hw, &mut sink);
        }

        let changes: Vec<_> = sink
            .events
            .iter()
            .filter_map(|e| match e {
                AppEvent::PresetChanged(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![Some(1), None]);
    }

    #[test]
    fn stop_command_leaves_automatic_mode() {
        let mut app = service();
        let mut hw = FakeHw::with_readings(vec![Ok(60.0)]);
        let mut sink = CollectingSink::default();
        app.begin(&mut hw, &mut sink);

        app.handle_command(AppCommand::SetTarget(100.0), 0, &mut hw, &mut sink);
        app.tick(0, &mut hw, &mut sink);
        app.handle_command(AppCommand::Stop, 100, &mut hw, &mut sink);
        assert!(!app.is_automatic());
        assert_eq!(app.motion_state(), MotionState::Stopped);
    }

    // ── Config persistence ────────────────────────────────────

    struct CountingConfig {
        saves: core::cell::Cell<usize>,
    }

    impl ConfigPort for CountingConfig {
        fn load(&self) -> Result<DeskConfig, super::super::ports::ConfigError> {
            Ok(DeskConfig::default())
        }
        fn save(&self, _config: &DeskConfig) -> Result<(), super::super::ports::ConfigError> {
            self.saves.set(self.saves.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn auto_save_debounces() {
        let mut app = service();
        let mut hw = FakeHw::with_readings(vec![Ok(80.0)]);
        let mut sink = CollectingSink::default();
        let storage = CountingConfig {
            saves: core::cell::Cell::new(0),
        };
        app.begin(&mut hw, &mut sink);

        app.tick(0, &mut hw, &mut sink);
        app.handle_command(AppCommand::SavePreset(0), 0, &mut hw, &mut sink);
        assert!(!app.auto_save_if_needed(&storage), "inside debounce window");

        for i in 1..=AUTO_SAVE_DEBOUNCE_TICKS {
            app.tick(i * 100, &mut hw, &mut sink);
        }
        assert!(app.auto_save_if_needed(&storage));
        assert_eq!(storage.saves.get(), 1);
        assert!(!app.is_config_dirty());
    }

    #[test]
    fn explicit_save_skips_debounce() {
        let mut app = service();
        let mut hw = FakeHw::with_readings(vec![Ok(80.0)]);
        let mut sink = CollectingSink::default();
        let storage = CountingConfig {
            saves: core::cell::Cell::new(0),
        };
        app.begin(&mut hw, &mut sink);

        app.handle_command(AppCommand::SaveConfig, 0, &mut hw, &mut sink);
        assert!(app.auto_save_if_needed(&storage));
        assert_eq!(storage.saves.get(), 1);
    }
}
