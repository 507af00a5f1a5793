//! Closed-loop height seeking.
//!
//! Invoked on every control tick while automatic mode is active: compare
//! the latest sensor height against the target and nudge the controller
//! in the right direction until the reading lands inside the deadband.
//! The deadband comparison is symmetric around the target, so the desk
//! stops anywhere within `target ± accuracy` — intentional hysteresis
//! against sensor noise and relay overshoot.

use log::info;

use super::DeskMotionController;
use crate::app::ports::RelayPort;

/// Result of one seek iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// Within the deadband; motion stopped. The caller leaves automatic mode.
    Reached,
    /// A direction command was issued (or deferred by the switch-delay
    /// lockout); invoke again on the next poll.
    InProgress,
}

/// One iteration of the height control loop.
///
/// The requested target is clamped into the controller's configured
/// bounds first, so seeking can never drive the desk outside them no
/// matter what was asked for.
pub fn seek(
    desk: &mut DeskMotionController,
    relays: &mut impl RelayPort,
    now_ms: u64,
    current_cm: f64,
    target_cm: f64,
) -> SeekOutcome {
    let target = desk.clamp_target(target_cm);
    let distance = target - current_cm;

    if distance.abs() < desk.target_accuracy_cm() {
        info!(
            "Reached target position (target: {:.2}cm, is: {:.2}cm)",
            target, current_cm
        );
        desk.stop(now_ms, relays);
        SeekOutcome::Reached
    } else if distance > 0.0 {
        desk.move_up(now_ms, relays);
        SeekOutcome::InProgress
    } else {
        desk.move_down(now_ms, relays);
        SeekOutcome::InProgress
    }
}
