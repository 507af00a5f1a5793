//! Event system feeding the main control loop.
//!
//! Events are produced by:
//! - Timer callbacks (control tick, telemetry cadence)
//! - The MQTT connection thread (command arrival, HA status)
//! - The paddle poll (debounced press/release edges)
//!
//! Events are consumed by the main control loop, which drains the queue
//! once per iteration. The queue carries *that something happened*;
//! payloads (command values) travel through the MQTT adapter's mailbox.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Timer ISR    │────▶│              │     │              │
//! │ MQTT thread  │────▶│  Event Queue │────▶│  Main Loop   │
//! │ Paddle poll  │────▶│  (lock-free) │     │  (consumer)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 32;

/// System event types. Paddle edges carry the lowest discriminants: a
/// manual edge observed in the same iteration as a control tick must be
/// handled first (override wins), and the main loop pushes edges before
/// the tick so FIFO order preserves that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    // ── Manual input (highest priority) ───────────────────
    /// Debounced paddle-up press edge.
    PaddleUpPressed = 0,
    /// Debounced paddle-up release edge.
    PaddleUpReleased = 1,
    /// Debounced paddle-down press edge.
    PaddleDownPressed = 2,
    /// Debounced paddle-down release edge.
    PaddleDownReleased = 3,

    // ── Control ───────────────────────────────────────────
    /// Control loop tick (sensor read + seek + preset match).
    ControlTick = 20,

    // ── Communication ─────────────────────────────────────
    /// Telemetry report timer fired.
    TelemetryTick = 30,
    /// An MQTT command landed in the adapter mailbox.
    CommandReceived = 31,
    /// Home Assistant announced itself online — re-publish discovery.
    HaStatusOnline = 32,
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// Producers run on the timer/MQTT side, the main loop consumes.
// Uses atomic head/tail indices. The buffer is intentionally
// kept in a static so timer callbacks can access it.

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
// SAFETY: EVENT_BUFFER is accessed exclusively through push_event
// (producer side) and pop_event (main-loop consumer). The atomics
// enforce the SPSC discipline: a slot is written before HEAD is
// released and read before TAIL is released, so no concurrent
// mutable access to the same slot is possible.
static mut EVENT_BUFFER: [u8; EVENT_QUEUE_CAP] = [0; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Safe to call from timer-callback context (lock-free).
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let head = EVENT_HEAD.load(Ordering::Relaxed);
    let tail = EVENT_TAIL.load(Ordering::Acquire);
    let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

    if next_head == tail {
        return false; // Queue full — drop event.
    }

    // SAFETY: Only one producer side writes this slot before the
    // Release store on HEAD publishes it.
    unsafe {
        EVENT_BUFFER[head as usize] = event as u8;
    }

    EVENT_HEAD.store(next_head, Ordering::Release);
    true
}

/// Pop the next event from the queue.
/// Called from the main loop (single consumer).
/// Returns `None` if the queue is empty.
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None; // Empty.
    }

    let raw = unsafe { EVENT_BUFFER[tail as usize] };
    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);

    event_from_u8(raw)
}

/// Drain all pending events into a callback.
/// Processes events in FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

/// Check if the event queue is empty.
pub fn queue_is_empty() -> bool {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);
    tail == head
}

/// Number of pending events.
pub fn queue_len() -> usize {
    let head = EVENT_HEAD.load(Ordering::Relaxed) as usize;
    let tail = EVENT_TAIL.load(Ordering::Relaxed) as usize;
    (head + EVENT_QUEUE_CAP - tail) % EVENT_QUEUE_CAP
}

// ── Internal ──────────────────────────────────────────────────

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0 => Some(Event::PaddleUpPressed),
        1 => Some(Event::PaddleUpReleased),
        2 => Some(Event::PaddleDownPressed),
        3 => Some(Event::PaddleDownReleased),
        20 => Some(Event::ControlTick),
        30 => Some(Event::TelemetryTick),
        31 => Some(Event::CommandReceived),
        32 => Some(Event::HaStatusOnline),
        _ => None,
    }
}

/// Serialises every test that touches the process-wide queue, including
/// tests in other modules that push events as a side effect.
#[cfg(test)]
pub(crate) static QUEUE_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
