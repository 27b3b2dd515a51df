//! Driver configuration.
//!
//! Everything the driver needs to know about the host is kept in one
//! [`HatConfig`], loaded from JSON. Missing fields fall back to the values
//! used by a stock Raspberry Pi with the HAT on the 40 pin header:
//!
//! ```json
//! {
//!   "device": "/dev/serial0",
//!   "firmware": "/home/pi/.local/share/buildhat/firmware.bin",
//!   "prompt_timeout_ms": 30000
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{HatError, Result};

/// Firmware build the driver is written against
pub const FIRMWARE_VERSION: u64 = 1643737936;

const CONFIG_FILE: &str = "config.json";

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "raspberrypi", "buildhat")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HatConfig {
    /// Serial device the HAT is attached to
    pub device: String,
    pub baud_rate: u32,
    /// Firmware image uploaded when the bootloader is found
    pub firmware: PathBuf,
    /// Signature matching `firmware`
    pub signature: PathBuf,
    pub firmware_version: u64,
    /// BCM number of the pin wired to the HAT's RESET line
    pub reset_pin: u32,
    /// BCM number of the pin wired to the HAT's BOOT0 line
    pub boot0_pin: u32,
    pub gpio_root: PathBuf,
    pub reset_time_unit_ms: u64,
    pub binary_mode_delay_ms: u64,
    pub reboot_delay_ms: u64,
    /// Bound on each line wait during negotiation and upload; none waits forever
    pub prompt_timeout_ms: Option<u64>,
    pub port_scan_timeout_ms: u64,
    /// How many firmware uploads one `open` may perform
    pub max_reflash: u32,
}

impl Default for HatConfig {
    fn default() -> Self {
        let data_dir = get_project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("data"));

        HatConfig {
            device: "/dev/serial0".to_string(),
            baud_rate: buildhat_core::protocol::BAUD_RATE,
            firmware: data_dir.join("firmware.bin"),
            signature: data_dir.join("signature.bin"),
            firmware_version: FIRMWARE_VERSION,
            reset_pin: 4,
            boot0_pin: 22,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            reset_time_unit_ms: 1000,
            binary_mode_delay_ms: 100,
            reboot_delay_ms: 5000,
            prompt_timeout_ms: None,
            port_scan_timeout_ms: 3000,
            max_reflash: 1,
        }
    }
}

impl HatConfig {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, `config.json` in the
    /// project config directory is used when present, else the defaults.
    pub fn load(path: Option<&Path>) -> Result<HatConfig> {
        match path {
            Some(path) => HatConfig::from_file(path),
            None => match get_project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE)) {
                Some(path) if path.exists() => HatConfig::from_file(&path),
                _ => {
                    log::debug!("No configuration file, using defaults");
                    Ok(HatConfig::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<HatConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HatError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: HatConfig = serde_json::from_str(&contents).map_err(|e| {
            HatError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;
        log::info!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(HatError::Config("serial device must not be empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(HatError::Config("baud rate must not be zero".into()));
        }
        if self.reset_pin == self.boot0_pin {
            return Err(HatError::Config(format!(
                "reset and boot0 share GPIO {}",
                self.reset_pin
            )));
        }
        Ok(())
    }

    pub fn reset_time_unit(&self) -> Duration {
        Duration::from_millis(self.reset_time_unit_ms)
    }

    pub fn binary_mode_delay(&self) -> Duration {
        Duration::from_millis(self.binary_mode_delay_ms)
    }

    pub fn reboot_delay(&self) -> Duration {
        Duration::from_millis(self.reboot_delay_ms)
    }

    pub fn prompt_timeout(&self) -> Option<Duration> {
        self.prompt_timeout_ms.map(Duration::from_millis)
    }

    pub fn port_scan_timeout(&self) -> Duration {
        Duration::from_millis(self.port_scan_timeout_ms)
    }
}
