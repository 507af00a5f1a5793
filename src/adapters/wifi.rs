//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`] — the hexagonal boundary for network
//! connectivity. Credentials come from the build-time configuration
//! (`SMARTDESK_WIFI_SSID` / `SMARTDESK_WIFI_PASS`), matching the
//! original firmware's compiled-in config header.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver calls.
//! - **all other targets**: simulation stubs for host-side tests.
//!
//! ## Reconnection policy
//!
//! On disconnect the adapter waits an exponential backoff (2 s → 4 s →
//! 8 s … capped at 60 s) before retrying, driven by the injected
//! monotonic clock — `poll()` never blocks the control loop.

use core::fmt;
use log::{error, info, warn};

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    AlreadyConnected,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AlreadyConnected => write!(f, "already connected to AP"),
        }
    }
}

pub trait ConnectivityPort {
    fn connect(&mut self) -> Result<(), ConnectivityError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    /// Advance the reconnect state machine; cheap, call every loop.
    fn poll(&mut self, now_ms: u64);
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;
}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connected,
    /// Waiting out the backoff before retry `attempt`.
    Reconnecting { attempt: u32 },
}

const INITIAL_BACKOFF_SECS: u64 = 2;
const MAX_BACKOFF_SECS: u64 = 60;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(()); // open network
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff_secs: u64,
    /// Monotonic deadline for the next reconnect attempt.
    next_retry_at_ms: u64,
    /// Simulation: counts platform_connect() calls for deterministic failures.
    #[cfg(not(target_os = "espidf"))]
    sim_connect_counter: u32,
}

impl WifiAdapter {
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            next_retry_at_ms: 0,
            #[cfg(not(target_os = "espidf"))]
            sim_connect_counter: 0,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        // Raw esp_wifi STA bring-up. Configuration structs are zeroed
        // and filled field-wise because the bindgen types carry unions.
        use esp_idf_svc::sys::*;

        // SAFETY: single-threaded main-task context; esp_netif/esp_event
        // were initialised by the binstart runtime.
        unsafe {
            let mut cfg: wifi_config_t = core::mem::zeroed();
            let ssid = self.ssid.as_bytes();
            cfg.sta.ssid[..ssid.len()].copy_from_slice(ssid);
            let pass = self.password.as_bytes();
            cfg.sta.password[..pass.len()].copy_from_slice(pass);

            if esp_wifi_set_mode(wifi_mode_t_WIFI_MODE_STA) != ESP_OK {
                return Err(ConnectivityError::ConnectionFailed);
            }
            if esp_wifi_set_config(wifi_interface_t_WIFI_IF_STA, &mut cfg) != ESP_OK {
                return Err(ConnectivityError::ConnectionFailed);
            }
            if esp_wifi_start() != ESP_OK {
                return Err(ConnectivityError::ConnectionFailed);
            }
            if esp_wifi_connect() != ESP_OK {
                return Err(ConnectivityError::ConnectionFailed);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        self.sim_connect_counter = self.sim_connect_counter.wrapping_add(1);
        // Every 10th attempt fails, exercising the backoff path.
        if self.sim_connect_counter % 10 == 3 {
            warn!(
                "WiFi(sim): simulated connect failure (attempt {})",
                self.sim_connect_counter
            );
            return Err(ConnectivityError::ConnectionFailed);
        }
        info!(
            "WiFi(sim): connected to '{}' (attempt {})",
            self.ssid, self.sim_connect_counter
        );
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        // SAFETY: stopping an already-stopped driver is harmless.
        unsafe {
            esp_idf_svc::sys::esp_wifi_disconnect();
            esp_idf_svc::sys::esp_wifi_stop();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        info!("WiFi(sim): disconnected");
    }
}

impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if self.state == WifiState::Connected {
            return Err(ConnectivityError::AlreadyConnected);
        }

        info!("WiFi: connecting to '{}'", self.ssid);
        match self.platform_connect() {
            Ok(()) => {
                self.state = WifiState::Connected;
                self.backoff_secs = INITIAL_BACKOFF_SECS;
                info!("WiFi: connected");
                Ok(())
            }
            Err(e) => {
                error!("WiFi: connection failed — {}", e);
                self.state = WifiState::Reconnecting { attempt: 0 };
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        self.state = WifiState::Disconnected;
        info!("WiFi: disconnected");
    }

    fn is_connected(&self) -> bool {
        self.state == WifiState::Connected
    }

    fn poll(&mut self, now_ms: u64) {
        if let WifiState::Reconnecting { attempt } = self.state {
            if self.next_retry_at_ms == 0 {
                // Arm the backoff timer for this attempt.
                self.next_retry_at_ms = now_ms + self.backoff_secs * 1000;
                return;
            }
            if now_ms < self.next_retry_at_ms {
                return;
            }

            self.next_retry_at_ms = 0;
            info!(
                "WiFi: reconnect attempt {} (backoff was {}s)",
                attempt + 1,
                self.backoff_secs
            );
            match self.platform_connect() {
                Ok(()) => {
                    self.state = WifiState::Connected;
                    self.backoff_secs = INITIAL_BACKOFF_SECS;
                    info!("WiFi: reconnected");
                }
                Err(_) => {
                    self.backoff_secs = (self.backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    self.state = WifiState::Reconnecting {
                        attempt: attempt + 1,
                    };
                }
            }
        }
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid
            .push_str(ssid)
            .map_err(|()| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|()| ConnectivityError::InvalidPassword)?;
        Ok(())
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_ssid() {
        let mut wifi = WifiAdapter::new();
        assert_eq!(
            wifi.set_credentials("", "password123"),
            Err(ConnectivityError::InvalidSsid)
        );
    }

    #[test]
    fn rejects_short_wpa2_password() {
        let mut wifi = WifiAdapter::new();
        assert_eq!(
            wifi.set_credentials("HomeNet", "short"),
            Err(ConnectivityError::InvalidPassword)
        );
    }

    #[test]
    fn open_network_password_allowed() {
        let mut wifi = WifiAdapter::new();
        assert!(wifi.set_credentials("HomeNet", "").is_ok());
    }

    #[test]
    fn connect_without_credentials_fails() {
        let mut wifi = WifiAdapter::new();
        assert_eq!(wifi.connect(), Err(ConnectivityError::NoCredentials));
    }

    #[test]
    fn connect_and_disconnect() {
        let mut wifi = WifiAdapter::new();
        wifi.set_credentials("HomeNet", "password123").unwrap();
        assert!(wifi.connect().is_ok());
        assert!(wifi.is_connected());
        wifi.disconnect();
        assert!(!wifi.is_connected());
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let mut wifi = WifiAdapter::new();
        wifi.set_credentials("HomeNet", "password123").unwrap();
        // Force the failing attempt (counter==3 fails).
        wifi.sim_connect_counter = 2;
        assert!(wifi.connect().is_err());
        assert!(matches!(wifi.state(), WifiState::Reconnecting { .. }));

        // First poll arms the timer; nothing happens before the deadline.
        wifi.poll(0);
        wifi.poll(1_000);
        assert!(!wifi.is_connected());

        // Past the 2 s backoff the retry runs and (counter==4) succeeds.
        wifi.poll(2_500);
        assert!(wifi.is_connected());
    }
}
