//! GPIO / peripheral pin assignments for the desk controller board.
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers. Change a pin here and it propagates everywhere.

// ---------------------------------------------------------------------------
// Actuator relays (dual SPDT module, active HIGH)
// ---------------------------------------------------------------------------

/// Digital output: energises the "raise" relay coil.
pub const RELAY_UP_GPIO: i32 = 10;
/// Digital output: energises the "lower" relay coil.
pub const RELAY_DOWN_GPIO: i32 = 11;

// ---------------------------------------------------------------------------
// Manual paddle (momentary rocker, active HIGH with pull-down)
// ---------------------------------------------------------------------------

/// Digital input: paddle held in the "up" position.
pub const PADDLE_UP_GPIO: i32 = 8;
/// Digital input: paddle held in the "down" position.
pub const PADDLE_DOWN_GPIO: i32 = 9;

// ---------------------------------------------------------------------------
// Height sensor — ultrasonic (HC-SR04 class)
// ---------------------------------------------------------------------------

/// Digital output: 10 µs trigger pulse starts a ranging cycle.
pub const SENSOR_TRIGGER_GPIO: i32 = 12;
/// Digital input: echo pulse width encodes the round-trip time.
pub const SENSOR_ECHO_GPIO: i32 = 13;

// ---------------------------------------------------------------------------
// Height sensor — time-of-flight (VL53L0X class, I²C)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 14;
pub const I2C_SCL_GPIO: i32 = 15;
/// 7-bit I²C address of the ToF ranging sensor.
pub const TOF_I2C_ADDR: u8 = 0x29;
