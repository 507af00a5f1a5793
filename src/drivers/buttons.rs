//! Debounced manual paddle input.
//!
//! The paddle is a momentary rocker: held up = raise, held down = lower,
//! released = stop. Unlike a click-style button there are no gestures to
//! classify — the control loop needs clean *level edges*, because motion
//! follows the held state directly (press starts, release stops).
//!
//! Each contact is debounced independently: a raw level change must hold
//! for `DEBOUNCE_MS` before the edge is reported. `poll()` is called from
//! the main loop at control-tick rate with injected monotonic time.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads real GPIO levels via hw_init helpers.
//! On host/test: reads simulation atomics.

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicBool, Ordering};

use crate::pins;

const DEBOUNCE_MS: u32 = 50;

#[cfg(not(target_os = "espidf"))]
static SIM_PADDLE_UP: AtomicBool = AtomicBool::new(false);
#[cfg(not(target_os = "espidf"))]
static SIM_PADDLE_DOWN: AtomicBool = AtomicBool::new(false);

#[cfg(not(target_os = "espidf"))]
pub fn sim_set_paddle(up: bool, down: bool) {
    SIM_PADDLE_UP.store(up, Ordering::Relaxed);
    SIM_PADDLE_DOWN.store(down, Ordering::Relaxed);
}

/// A debounced paddle edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddleEvent {
    UpPressed,
    UpReleased,
    DownPressed,
    DownReleased,
}

/// Debounce filter for one contact.
#[derive(Debug, Clone, Copy)]
struct DebouncedLevel {
    stable: bool,
    candidate: bool,
    candidate_since_ms: u32,
}

impl DebouncedLevel {
    fn new() -> Self {
        Self {
            stable: false,
            candidate: false,
            candidate_since_ms: 0,
        }
    }

    /// Feed a raw sample; returns the new stable level on an accepted edge.
    fn sample(&mut self, raw: bool, now_ms: u32) -> Option<bool> {
        if raw != self.candidate {
            self.candidate = raw;
            self.candidate_since_ms = now_ms;
            return None;
        }
        if raw != self.stable && now_ms.wrapping_sub(self.candidate_since_ms) >= DEBOUNCE_MS {
            self.stable = raw;
            return Some(raw);
        }
        None
    }
}

pub struct PaddleInput {
    up: DebouncedLevel,
    down: DebouncedLevel,
}

impl PaddleInput {
    pub fn new() -> Self {
        Self {
            up: DebouncedLevel::new(),
            down: DebouncedLevel::new(),
        }
    }

    /// Call from the main loop at each control tick.
    /// `now_ms` is the current monotonic time in milliseconds.
    /// Returns every debounced edge observed this tick (at most one per
    /// contact).
    pub fn poll(&mut self, now_ms: u32) -> heapless::Vec<PaddleEvent, 2> {
        let mut events = heapless::Vec::new();

        if let Some(level) = self.up.sample(Self::read_up_hw(), now_ms) {
            let ev = if level {
                PaddleEvent::UpPressed
            } else {
                PaddleEvent::UpReleased
            };
            let _ = events.push(ev);
        }

        if let Some(level) = self.down.sample(Self::read_down_hw(), now_ms) {
            let ev = if level {
                PaddleEvent::DownPressed
            } else {
                PaddleEvent::DownReleased
            };
            let _ = events.push(ev);
        }

        events
    }

    #[cfg(target_os = "espidf")]
    fn read_up_hw() -> bool {
        crate::drivers::hw_init::gpio_read(pins::PADDLE_UP_GPIO)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_up_hw() -> bool {
        let _ = pins::PADDLE_UP_GPIO;
        SIM_PADDLE_UP.load(Ordering::Relaxed)
    }

    #[cfg(target_os = "espidf")]
    fn read_down_hw() -> bool {
        crate::drivers::hw_init::gpio_read(pins::PADDLE_DOWN_GPIO)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_down_hw() -> bool {
        SIM_PADDLE_DOWN.load(Ordering::Relaxed)
    }
}
