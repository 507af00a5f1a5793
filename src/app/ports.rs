//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AppService (domain)
//! ```
//!
//! Driven adapters (the height sensor, the relay board, event sinks,
//! persistent storage) implement these traits. The
//! [`AppService`](super::service::AppService) consumes them via generics,
//! so the domain core never touches hardware directly.

use crate::config::DeskConfig;
use crate::error::SensorError;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this to obtain the desk height.
pub trait SensorPort {
    /// One bounded height measurement in centimetres.
    ///
    /// An `Err` (bus failure, timeout, implausible reading) means "no
    /// update this tick" — the caller must skip its control decision
    /// rather than act on stale or undefined data.
    fn read_height_cm(&mut self) -> Result<f64, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Relay port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port for the two actuator relays. Invoked only by
/// [`DeskMotionController`](crate::motion::DeskMotionController), which
/// guarantees the Up and Down lines are never active together.
pub trait RelayPort {
    /// Energise / release the "raise" relay.
    fn set_up(&mut self, active: bool);

    /// Energise / release the "lower" relay.
    fn set_down(&mut self, active: bool);

    /// Release both relays — safe shutdown.
    fn all_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port. Adapters decide where they go (serial log, MQTT
/// state topics, etc.).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists desk configuration (bounds, accuracy, presets).
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped — a compromised command channel must not be able
/// to inject dangerous operating parameters (e.g. inverting the travel
/// bounds).
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`DeskConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<DeskConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &DeskConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
