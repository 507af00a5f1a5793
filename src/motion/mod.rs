//! Desk motion control — the relay direction state machine.
//!
//! [`DeskMotionController`] owns the movement state and is the only
//! component that commands the relay outputs (through the injected
//! [`RelayPort`]). It enforces two hardware-protection rules:
//!
//! 1. The Up and Down outputs are never simultaneously active.
//! 2. After any stop, neither direction re-engages until the switch
//!    delay has elapsed (relay/actuator anti-chatter). A call inside
//!    the lockout window changes nothing; the caller retries on a
//!    later poll.
//!
//! Monotonic time is passed in as `now_ms` on every time-gated call,
//! never read internally, so the lockout is deterministic under test.

pub mod preset;
pub mod seek;

use log::{debug, info};

use crate::app::ports::RelayPort;
use crate::config::DeskConfig;

/// Movement state. Exactly one variant holds at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Stopped,
    MovingUp,
    MovingDown,
}

/// Relay direction/debounce state machine.
pub struct DeskMotionController {
    state: MotionState,
    /// Monotonic ms of the last transition into `Stopped`.
    /// `None` until the first stop-from-motion, so the first engage
    /// after boot is never locked out.
    last_stop_ms: Option<u64>,
    switch_delay_ms: u64,
    target_accuracy_cm: f64,
    min_height_cm: f64,
    max_height_cm: f64,
}

impl DeskMotionController {
    pub fn new(config: &DeskConfig) -> Self {
        Self {
            state: MotionState::Stopped,
            last_stop_ms: None,
            switch_delay_ms: config.switch_delay_ms,
            target_accuracy_cm: config.target_accuracy_cm,
            min_height_cm: config.min_height_cm,
            max_height_cm: config.max_height_cm,
        }
    }

    /// Drive both outputs inactive and establish the initial `Stopped`
    /// state. Call once at boot before any motion command.
    pub fn begin(&mut self, relays: &mut impl RelayPort) {
        relays.set_up(false);
        relays.set_down(false);
        self.state = MotionState::Stopped;
        self.last_stop_ms = None;
    }

    /// Request upward motion.
    ///
    /// No-op while already moving up. While moving down this performs the
    /// stop half of the reversal only — the caller re-invokes on later
    /// polls and the Up relay engages once the switch delay has elapsed.
    pub fn move_up(&mut self, now_ms: u64, relays: &mut impl RelayPort) {
        match self.state {
            MotionState::MovingUp => {}
            MotionState::MovingDown => {
                // Reversal is never direct.
                self.stop(now_ms, relays);
            }
            MotionState::Stopped => {
                if self.lockout_active(now_ms) {
                    debug!("moveUp deferred: switch delay not elapsed");
                    return;
                }
                relays.set_down(false);
                relays.set_up(true);
                self.state = MotionState::MovingUp;
                info!("Desk moving up");
            }
        }
    }

    /// Request downward motion. Symmetric to [`move_up`](Self::move_up).
    pub fn move_down(&mut self, now_ms: u64, relays: &mut impl RelayPort) {
        match self.state {
            MotionState::MovingDown => {}
            MotionState::MovingUp => {
                self.stop(now_ms, relays);
            }
            MotionState::Stopped => {
                if self.lockout_active(now_ms) {
                    debug!("moveDown deferred: switch delay not elapsed");
                    return;
                }
                relays.set_up(false);
                relays.set_down(true);
                self.state = MotionState::MovingDown;
                info!("Desk moving down");
            }
        }
    }

    /// Halt motion. No-op while already stopped, so a physical stop
    /// records exactly one timestamp.
    pub fn stop(&mut self, now_ms: u64, relays: &mut impl RelayPort) {
        if self.state == MotionState::Stopped {
            return;
        }
        relays.set_up(false);
        relays.set_down(false);
        self.state = MotionState::Stopped;
        self.last_stop_ms = Some(now_ms);
        info!("Desk stop");
    }

    pub fn is_moving(&self) -> bool {
        self.state != MotionState::Stopped
    }

    pub fn state(&self) -> MotionState {
        self.state
    }

    pub fn target_accuracy_cm(&self) -> f64 {
        self.target_accuracy_cm
    }

    /// Clamp a requested target into the configured travel bounds.
    pub fn clamp_target(&self, target_cm: f64) -> f64 {
        target_cm.clamp(self.min_height_cm, self.max_height_cm)
    }

    pub fn bounds_cm(&self) -> (f64, f64) {
        (self.min_height_cm, self.max_height_cm)
    }

    /// Re-apply the motion-related fields of a (validated) config.
    /// Takes effect on the next command; in-flight motion is untouched.
    pub fn apply_config(&mut self, config: &DeskConfig) {
        self.switch_delay_ms = config.switch_delay_ms;
        self.target_accuracy_cm = config.target_accuracy_cm;
        self.min_height_cm = config.min_height_cm;
        self.max_height_cm = config.max_height_cm;
    }

    fn lockout_active(&self, now_ms: u64) -> bool {
        match self.last_stop_ms {
            None => false,
            Some(stopped_at) => now_ms.saturating_sub(stopped_at) < self.switch_delay_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::RelayPort;

    /// Records relay line levels and every write, for asserting on both
    /// final state and write ordering.
    pub(crate) struct SpyRelays {
        pub up: bool,
        pub down: bool,
        pub writes: Vec<(char, bool)>,
    }

    impl SpyRelays {
        pub(crate) fn new() -> Self {
            Self {
                up: false,
                down: false,
                writes: Vec::new(),
            }
        }

        pub(crate) fn both_inactive(&self) -> bool {
            !self.up && !self.down
        }
    }

    impl RelayPort for SpyRelays {
        fn set_up(&mut self, active: bool) {
            self.up = active;
            self.writes.push(('U', active));
        }

        fn set_down(&mut self, active: bool) {
            self.down = active;
            self.writes.push(('D', active));
        }

        fn all_off(&mut self) {
            self.set_up(false);
            self.set_down(false);
        }
    }

    fn controller() -> DeskMotionController {
        DeskMotionController::new(&DeskConfig::default())
    }

    #[test]
    fn begin_forces_stopped_with_outputs_inactive() {
        let mut desk = controller();
        let mut relays = SpyRelays::new();
        desk.begin(&mut relays);
        assert_eq!(desk.state(), MotionState::Stopped);
        assert!(relays.both_inactive());
    }

    #[test]
    fn first_move_after_boot_is_not_locked_out() {
        let mut desk = controller();
        let mut relays = SpyRelays::new();
        desk.begin(&mut relays);
        desk.move_up(0, &mut relays);
        assert_eq!(desk.state(), MotionState::MovingUp);
        assert!(relays.up && !relays.down);
    }

    #[test]
    fn outputs_never_simultaneously_active() {
        let mut desk = controller();
        let mut relays = SpyRelays::new();
        desk.begin(&mut relays);

        let mut now = 0u64;
        for _ in 0..5 {
            desk.move_up(now, &mut relays);
            assert!(!(relays.up && relays.down));
            now += 100;
            desk.move_down(now, &mut relays);
            assert!(!(relays.up && relays.down));
            now += 5000;
            desk.move_down(now, &mut relays);
            assert!(!(relays.up && relays.down));
            now += 100;
            desk.stop(now, &mut relays);
            assert!(!(relays.up && relays.down));
            now += 5000;
        }
    }

    #[test]
    fn move_up_while_moving_up_is_noop() {
        let mut desk = controller();
        let mut relays = SpyRelays::new();
        desk.begin(&mut relays);
        desk.move_up(0, &mut relays);
        let writes_before = relays.writes.len();
        desk.move_up(50, &mut relays);
        assert_eq!(desk.state(), MotionState::MovingUp);
        assert_eq!(relays.writes.len(), writes_before, "no redundant writes");
    }

    #[test]
    fn stop_twice_records_one_timestamp() {
        let mut desk = controller();
        let mut relays = SpyRelays::new();
        desk.begin(&mut relays);
        desk.move_up(0, &mut relays);
        desk.stop(1000, &mut relays);
        assert_eq!(desk.last_stop_ms, Some(1000));
        desk.stop(2000, &mut relays);
        assert_eq!(desk.last_stop_ms, Some(1000), "second stop is a no-op");
    }

    #[test]
    fn engage_within_switch_delay_is_deferred() {
        let mut desk = controller();
        let mut relays = SpyRelays::new();
        desk.begin(&mut relays);
        desk.move_up(0, &mut relays);
        desk.stop(1000, &mut relays);

        desk.move_down(1000 + 3999, &mut relays);
        assert_eq!(desk.state(), MotionState::Stopped);
        assert!(relays.both_inactive());

        desk.move_down(1000 + 4001, &mut relays);
        assert_eq!(desk.state(), MotionState::MovingDown);
        assert!(relays.down && !relays.up);
    }

    #[test]
    fn engage_at_exact_delay_boundary_succeeds() {
        let mut desk = controller();
        let mut relays = SpyRelays::new();
        desk.begin(&mut relays);
        desk.move_down(0, &mut relays);
        desk.stop(500, &mut relays);
        desk.move_up(500 + 4000, &mut relays);
        assert_eq!(desk.state(), MotionState::MovingUp);
    }

    #[test]
    fn reversal_passes_through_stop() {
        let mut desk = controller();
        let mut relays = SpyRelays::new();
        desk.begin(&mut relays);
        desk.move_up(0, &mut relays);

        // First reversal call only stops; the lockout then defers the
        // opposite direction until the delay has elapsed.
        desk.move_down(2000, &mut relays);
        assert_eq!(desk.state(), MotionState::Stopped);
        assert_eq!(desk.last_stop_ms, Some(2000));

        desk.move_down(2000 + 3999, &mut relays);
        assert_eq!(desk.state(), MotionState::Stopped);

        desk.move_down(2000 + 4000, &mut relays);
        assert_eq!(desk.state(), MotionState::MovingDown);
    }

    #[test]
    fn deactivation_precedes_activation_on_engage() {
        let mut desk = controller();
        let mut relays = SpyRelays::new();
        desk.begin(&mut relays);
        relays.writes.clear();
        desk.move_up(0, &mut relays);
        assert_eq!(relays.writes, vec![('D', false), ('U', true)]);
    }

    #[test]
    fn clamp_target_respects_bounds() {
        let desk = controller();
        let (min, max) = desk.bounds_cm();
        assert_eq!(desk.clamp_target(min - 50.0), min);
        assert_eq!(desk.clamp_target(max + 50.0), max);
        assert_eq!(desk.clamp_target(90.0), 90.0);
    }

    #[test]
    fn apply_config_updates_lockout_duration() {
        let mut desk = controller();
        let mut relays = SpyRelays::new();
        desk.begin(&mut relays);
        desk.move_up(0, &mut relays);
        desk.stop(1000, &mut relays);

        let mut cfg = DeskConfig::default();
        cfg.switch_delay_ms = 500;
        desk.apply_config(&cfg);

        desk.move_down(1600, &mut relays);
        assert_eq!(desk.state(), MotionState::MovingDown);
    }
}
