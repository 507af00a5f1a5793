//! One-shot hardware peripheral initialization.
//!
//! Configures GPIO directions, the I²C master (for the ToF sensor) and
//! the ultrasonic trigger/echo pins using raw ESP-IDF sys calls. Called
//! once from `main()` before the event loop starts.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    I2cInitFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::I2cInitFailed(rc) => write!(f, "I2C master init failed (rc={})", rc),
        }
    }
}

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::pins;

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before event loop; single-threaded.
    unsafe {
        init_gpio_inputs()?;
        init_gpio_outputs()?;
    }
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_inputs() -> Result<(), HwInitError> {
    // Paddle contacts close to 3V3, so idle level is pulled down.
    let paddle_pins = [pins::PADDLE_UP_GPIO, pins::PADDLE_DOWN_GPIO];
    for &pin in &paddle_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_ENABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
    }

    // Echo is driven by the ranger's push-pull output; no pull needed.
    let echo_cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::SENSOR_ECHO_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    let ret = unsafe { gpio_config(&echo_cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }

    info!("hw_init: GPIO inputs configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access on an
    // already-configured input pin; safe to call from main context.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    false
}

// ── GPIO Outputs ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_gpio_outputs() -> Result<(), HwInitError> {
    let output_pins = [
        pins::RELAY_UP_GPIO,
        pins::RELAY_DOWN_GPIO,
        pins::SENSOR_TRIGGER_GPIO,
    ];

    for &pin in &output_pins {
        let cfg = gpio_config_t {
            pin_bit_mask: 1u64 << pin,
            mode: gpio_mode_t_GPIO_MODE_OUTPUT,
            pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
            pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
        };
        let ret = unsafe { gpio_config(&cfg) };
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
        // Relays released, trigger idle-low.
        unsafe { gpio_set_level(pin, 0) };
    }

    info!("hw_init: GPIO outputs configured");
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(pin: i32, high: bool) {
    // SAFETY: gpio_set_level writes to an already-configured output pin;
    // pin was validated during init_gpio_outputs(). Main-loop only.
    unsafe {
        gpio_set_level(pin, if high { 1 } else { 0 });
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_write(_pin: i32, _high: bool) {}

// ── Timing helpers (ultrasonic ranging) ───────────────────────

/// Busy-wait for `us` microseconds. Only for the few-µs trigger pulse.
#[cfg(target_os = "espidf")]
pub fn busy_wait_us(us: u32) {
    // SAFETY: esp_rom_delay_us is a plain CPU spin loop.
    unsafe { esp_rom_delay_us(us) };
}

#[cfg(not(target_os = "espidf"))]
pub fn busy_wait_us(_us: u32) {}

/// Measure the duration of the next high pulse on `pin`, in microseconds.
///
/// Blocks at most `timeout_us` waiting for the pulse to start AND at most
/// `timeout_us` for it to end; returns `None` on either timeout. This is
/// the one bounded synchronous wait in the system.
#[cfg(target_os = "espidf")]
pub fn pulse_high_us(pin: i32, timeout_us: u64) -> Option<u64> {
    // SAFETY: esp_timer_get_time is monotonic and ISR-safe; gpio_get_level
    // is a read-only register access.
    unsafe {
        let deadline = esp_timer_get_time() + timeout_us as i64;
        while gpio_get_level(pin) == 0 {
            if esp_timer_get_time() > deadline {
                return None;
            }
        }
        let rise = esp_timer_get_time();
        let deadline = rise + timeout_us as i64;
        while gpio_get_level(pin) != 0 {
            if esp_timer_get_time() > deadline {
                return None;
            }
        }
        Some((esp_timer_get_time() - rise) as u64)
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn pulse_high_us(_pin: i32, _timeout_us: u64) -> Option<u64> {
    None
}

// ── I²C master (ToF ranger) ───────────────────────────────────

#[cfg(target_os = "espidf")]
const I2C_PORT: i32 = 0;
#[cfg(target_os = "espidf")]
const I2C_TIMEOUT_TICKS: u32 = 100;

/// Configure the I²C master for the ToF sensor. Only called when the
/// config selects `SensorKind::TimeOfFlight`.
#[cfg(target_os = "espidf")]
pub fn init_i2c() -> Result<(), HwInitError> {
    let cfg = i2c_config_t {
        mode: i2c_mode_t_I2C_MODE_MASTER,
        sda_io_num: pins::I2C_SDA_GPIO,
        scl_io_num: pins::I2C_SCL_GPIO,
        sda_pullup_en: true,
        scl_pullup_en: true,
        __bindgen_anon_1: i2c_config_t__bindgen_ty_1 {
            master: i2c_config_t__bindgen_ty_1__bindgen_ty_1 {
                clk_speed: 400_000,
            },
        },
        ..Default::default()
    };

    // SAFETY: single-threaded init path, before the event loop.
    unsafe {
        let ret = i2c_param_config(I2C_PORT, &cfg);
        if ret != ESP_OK as i32 {
            return Err(HwInitError::I2cInitFailed(ret));
        }
        let ret = i2c_driver_install(I2C_PORT, i2c_mode_t_I2C_MODE_MASTER, 0, 0, 0);
        if ret != ESP_OK as i32 {
            return Err(HwInitError::I2cInitFailed(ret));
        }
    }
    info!("hw_init: I2C master configured (400 kHz)");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_i2c() -> Result<(), HwInitError> {
    Ok(())
}

/// Read a big-endian u16 register from an I²C device.
/// Returns the raw esp_err code on failure.
#[cfg(target_os = "espidf")]
pub fn i2c_read_u16(addr: u8, reg: u8) -> Result<u16, i32> {
    let mut buf = [0u8; 2];
    // SAFETY: i2c driver installed by init_i2c(); main-loop access only.
    let ret = unsafe {
        i2c_master_write_read_device(
            I2C_PORT,
            addr,
            &reg,
            1,
            buf.as_mut_ptr(),
            buf.len(),
            I2C_TIMEOUT_TICKS,
        )
    };
    if ret != ESP_OK as i32 {
        return Err(ret);
    }
    Ok(u16::from_be_bytes(buf))
}

#[cfg(not(target_os = "espidf"))]
pub fn i2c_read_u16(_addr: u8, _reg: u8) -> Result<u16, i32> {
    Err(-1)
}
