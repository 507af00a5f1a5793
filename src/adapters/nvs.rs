//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`ConfigPort`] for the desk controller: the whole
//! [`DeskConfig`] (bounds, accuracy, switch delay, presets) travels as a
//! single postcard blob under one key.
//!
//! - Config validation: all fields are range-checked before persistence.
//!   Invalid values are rejected, never silently clamped.
//! - Atomic writes: ESP-IDF NVS commits are atomic per nvs_commit().
//! - Simulation backend: plain `HashMap` on host targets.

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::DeskConfig;
use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "smartdesk";
#[cfg(not(target_os = "espidf"))]
const CONFIG_KEY: &str = "deskcfg";

#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 1024;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// Returns `Err(ConfigError::IoError)` if flash initialisation fails
    /// unrecoverably. On first boot or after a version mismatch the NVS
    /// partition is erased and re-initialised automatically.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret2 = unsafe { nvs_flash_erase() };
                if ret2 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
                let ret3 = unsafe { nvs_flash_init() };
                if ret3 != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }
}

pub(crate) fn validate_config(cfg: &DeskConfig) -> Result<(), ConfigError> {
    if !(20.0..=300.0).contains(&cfg.min_height_cm) {
        return Err(ConfigError::ValidationFailed(
            "min_height_cm must be 20.0–300.0",
        ));
    }
    if !(20.0..=300.0).contains(&cfg.max_height_cm) {
        return Err(ConfigError::ValidationFailed(
            "max_height_cm must be 20.0–300.0",
        ));
    }
    if cfg.min_height_cm >= cfg.max_height_cm {
        return Err(ConfigError::ValidationFailed(
            "min_height_cm must be < max_height_cm",
        ));
    }
    if !(0.5..=20.0).contains(&cfg.target_accuracy_cm) {
        return Err(ConfigError::ValidationFailed(
            "target_accuracy_cm must be 0.5–20.0",
        ));
    }
    if !(500..=30_000).contains(&cfg.switch_delay_ms) {
        return Err(ConfigError::ValidationFailed(
            "switch_delay_ms must be 500–30000",
        ));
    }
    for &preset in &cfg.presets {
        if !(cfg.min_height_cm..=cfg.max_height_cm).contains(&preset) {
            return Err(ConfigError::ValidationFailed(
                "preset heights must lie within [min_height_cm, max_height_cm]",
            ));
        }
    }
    if !(20..=1000).contains(&cfg.control_loop_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "control_loop_interval_ms must be 20–1000",
        ));
    }
    if !(5..=3600).contains(&cfg.telemetry_interval_secs) {
        return Err(ConfigError::ValidationFailed(
            "telemetry_interval_secs must be 5–3600",
        ));
    }
    if !(100..=60_000).contains(&cfg.height_publish_min_interval_ms) {
        return Err(ConfigError::ValidationFailed(
            "height_publish_min_interval_ms must be 100–60000",
        ));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<DeskConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            if let Some(bytes) = self.store.borrow().get(&key) {
                let cfg: DeskConfig =
                    postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                info!("NvsAdapter: loaded config from store");
                Ok(cfg)
            } else {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(DeskConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, false, |handle| {
                let key_cstr = b"deskcfg\0";
                let mut size: usize = 0;

                // First call: get size
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret == ESP_ERR_NVS_NOT_FOUND {
                    return Err(ESP_ERR_NVS_NOT_FOUND);
                }
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg: DeskConfig =
                        postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("NvsAdapter: loaded config from NVS");
                    Ok(cfg)
                }
                Err(rc) if rc == ESP_ERR_NVS_NOT_FOUND => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(DeskConfig::default())
                }
                Err(_) => Err(ConfigError::IoError),
            }
        }
    }

    fn save(&self, config: &DeskConfig) -> Result<(), ConfigError> {
        validate_config(config)?;

        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        if bytes.len() > MAX_BLOB_SIZE {
            return Err(ConfigError::StorageFull);
        }

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, bytes);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let key_cstr = b"deskcfg\0";
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key_cstr.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });

            match result {
                Ok(()) => Ok(()),
                Err(rc) if rc == ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(ConfigError::StorageFull),
                Err(_) => Err(ConfigError::IoError),
            }
        }
    }
}

impl Default for NvsAdapter {
    fn default() -> Self {
        Self::new().unwrap_or(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        assert!(validate_config(&DeskConfig::default()).is_ok());
    }

    #[test]
    fn rejects_inverted_bounds() {
        let mut cfg = DeskConfig::default();
        cfg.min_height_cm = 130.0;
        cfg.max_height_cm = 60.0;
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_zero_accuracy() {
        let mut cfg = DeskConfig::default();
        cfg.target_accuracy_cm = 0.0;
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_preset_outside_bounds() {
        let mut cfg = DeskConfig::default();
        cfg.presets[0] = cfg.max_height_cm + 10.0;
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_chatter_inviting_switch_delay() {
        let mut cfg = DeskConfig::default();
        cfg.switch_delay_ms = 100;
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn save_then_load_round_trips() {
        let nvs = NvsAdapter::new().unwrap();
        let mut cfg = DeskConfig::default();
        cfg.target_accuracy_cm = 3.0;
        cfg.presets[0] = 66.0;

        nvs.save(&cfg).unwrap();
        let loaded = nvs.load().unwrap();
        assert!((loaded.target_accuracy_cm - 3.0).abs() < 1e-9);
        assert!((loaded.presets[0] - 66.0).abs() < 1e-9);
    }

    #[test]
    fn load_without_save_yields_defaults() {
        let nvs = NvsAdapter::new().unwrap();
        let loaded = nvs.load().unwrap();
        assert!((loaded.target_accuracy_cm - DeskConfig::default().target_accuracy_cm).abs() < 1e-9);
    }

    #[test]
    fn invalid_config_never_persisted() {
        let nvs = NvsAdapter::new().unwrap();
        let mut cfg = DeskConfig::default();
        cfg.max_height_cm = cfg.min_height_cm; // inverted window
        assert!(nvs.save(&cfg).is_err());
        // Store untouched: load still yields defaults.
        let loaded = nvs.load().unwrap();
        assert!((loaded.max_height_cm - DeskConfig::default().max_height_cm).abs() < 1e-9);
    }
}
