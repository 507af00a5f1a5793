//! Property tests for the motion core.
//!
//! Runs on host (x86_64) only — proptest is not available for ESP32
//! targets. On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use proptest::prelude::*;
use smartdesk::app::ports::RelayPort;
use smartdesk::config::DeskConfig;
use smartdesk::motion::preset::match_preset;
use smartdesk::motion::seek::{seek, SeekOutcome};
use smartdesk::motion::{DeskMotionController, MotionState};

// ── Relay spy ─────────────────────────────────────────────────

#[derive(Default)]
struct SpyRelays {
    up: bool,
    down: bool,
    violation: bool,
}

impl RelayPort for SpyRelays {
    fn set_up(&mut self, active: bool) {
        self.up = active;
        if self.up && self.down {
            self.violation = true;
        }
    }
    fn set_down(&mut self, active: bool) {
        self.down = active;
        if self.up && self.down {
            self.violation = true;
        }
    }
    fn all_off(&mut self) {
        self.up = false;
        self.down = false;
    }
}

// ── Arbitrary command sequences ───────────────────────────────

#[derive(Debug, Clone)]
enum Op {
    MoveUp,
    MoveDown,
    Stop,
    /// Advance the injected clock by this many ms before the next op.
    Wait(u64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::MoveUp),
        Just(Op::MoveDown),
        Just(Op::Stop),
        (0u64..=6_000u64).prop_map(Op::Wait),
    ]
}

proptest! {
    /// Core invariant: no reachable call sequence ever energises both
    /// relay coils at once, and the reported state always agrees with
    /// the relay lines.
    #[test]
    fn relays_never_both_active(ops in proptest::collection::vec(arb_op(), 1..=60)) {
        let mut desk = DeskMotionController::new(&DeskConfig::default());
        let mut relays = SpyRelays::default();
        desk.begin(&mut relays);

        let mut now: u64 = 0;
        for op in &ops {
            match op {
                Op::MoveUp => desk.move_up(now, &mut relays),
                Op::MoveDown => desk.move_down(now, &mut relays),
                Op::Stop => desk.stop(now, &mut relays),
                Op::Wait(ms) => now += ms,
            }

            prop_assert!(!relays.violation, "both coils energised");
            match desk.state() {
                MotionState::Stopped => {
                    prop_assert!(!relays.up && !relays.down);
                }
                MotionState::MovingUp => {
                    prop_assert!(relays.up && !relays.down);
                }
                MotionState::MovingDown => {
                    prop_assert!(relays.down && !relays.up);
                }
            }
        }
    }

    /// After a stop-from-motion, engaging either direction strictly
    /// inside the switch-delay window never leaves Stopped.
    #[test]
    fn lockout_defers_engage(
        elapsed in 0u64..4_000u64,
        go_up in proptest::bool::ANY,
    ) {
        let mut desk = DeskMotionController::new(&DeskConfig::default());
        let mut relays = SpyRelays::default();
        desk.begin(&mut relays);

        desk.move_up(0, &mut relays);
        desk.stop(10_000, &mut relays);

        if go_up {
            desk.move_up(10_000 + elapsed, &mut relays);
        } else {
            desk.move_down(10_000 + elapsed, &mut relays);
        }
        prop_assert_eq!(desk.state(), MotionState::Stopped);
    }

    /// seek() reports Reached exactly when the clamped target is within
    /// the deadband, and otherwise moves in the direction of the target.
    #[test]
    fn seek_outcome_matches_deadband(
        current in 20.0f64..300.0f64,
        target in -100.0f64..500.0f64,
    ) {
        let config = DeskConfig::default();
        let mut desk = DeskMotionController::new(&config);
        let mut relays = SpyRelays::default();
        desk.begin(&mut relays);

        let clamped = target.clamp(config.min_height_cm, config.max_height_cm);
        let outcome = seek(&mut desk, &mut relays, 0, current, target);

        if (clamped - current).abs() < config.target_accuracy_cm {
            prop_assert_eq!(outcome, SeekOutcome::Reached);
            prop_assert_eq!(desk.state(), MotionState::Stopped);
        } else {
            prop_assert_eq!(outcome, SeekOutcome::InProgress);
            let expected = if clamped > current {
                MotionState::MovingUp
            } else {
                MotionState::MovingDown
            };
            prop_assert_eq!(desk.state(), expected);
        }
        prop_assert!(!relays.violation);
    }

    /// Repeated seeking against a monotone approach always terminates in
    /// Reached without overshooting the commanded direction.
    #[test]
    fn seek_converges_on_monotone_approach(
        start in 60.0f64..125.0f64,
        target in 60.0f64..125.0f64,
        step in 0.5f64..4.0f64,
    ) {
        let config = DeskConfig::default();
        let mut desk = DeskMotionController::new(&config);
        let mut relays = SpyRelays::default();
        desk.begin(&mut relays);

        let mut height = start;
        let mut now = 0u64;
        let mut reached = false;
        for _ in 0..500 {
            match seek(&mut desk, &mut relays, now, height, target) {
                SeekOutcome::Reached => {
                    reached = true;
                    break;
                }
                SeekOutcome::InProgress => {
                    // The desk moves toward the target by one step per tick.
                    match desk.state() {
                        MotionState::MovingUp => height += step,
                        MotionState::MovingDown => height -= step,
                        MotionState::Stopped => {}
                    }
                    now += 100;
                }
            }
        }
        prop_assert!(reached, "seek failed to converge");
        prop_assert!((target - height).abs() < config.target_accuracy_cm + step);
        prop_assert!(!relays.violation);
    }

    /// The preset matcher always returns the lowest matching slot and
    /// never a non-matching one.
    #[test]
    fn preset_match_is_lowest_matching_slot(
        presets in proptest::collection::vec(20.0f64..300.0f64, 0..=3),
        current in 20.0f64..300.0f64,
        accuracy in 0.5f64..20.0f64,
    ) {
        let result = match_preset(current, &presets, accuracy);
        let expected = presets
            .iter()
            .position(|p| (p - current).abs() < accuracy);
        prop_assert_eq!(result, expected);
        if let Some(slot) = result {
            prop_assert!((presets[slot] - current).abs() < accuracy);
        }
    }
}
