//! # Configuration
//!
//! `config.toml` describes logging, where the display model lives, the fallback
//! sunrise/sunset schedule and one `[[devices]]` table per panel.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nextion_bridge::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     println!("{} device(s)", config.devices.len());
//!     Ok(())
//! }
//! ```
//!
//! ## File format
//!
//! ```toml
//! [logging]
//! level = "info"
//! file = "nextion-bridge.log"
//!
//! [display]
//! model_file = "display.toml"
//! default_mode = "day"
//!
//! [sun]
//! sunrise = "06:00"
//! sunset = "18:00"
//! twilight_minutes = 30
//!
//! [[devices]]
//! port = "/dev/ttyUSB0"
//! baud_rate = 9600
//! night_dim = 33
//! advance_pages = 0
//! ```
//!
//! Every device field except `port` has a default.

use crate::device::DeviceTiming;
use crate::model::Mode;
use crate::session::{FixedSchedule, SessionSettings};
use anyhow::{anyhow, bail, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub logging: LoggingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub sun: SunConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// TOML display model (pages, items, buttons, colors).
    pub model_file: String,
    /// Mode used when none can be calculated from the position.
    #[serde(default = "default_mode")]
    pub default_mode: Mode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            model_file: "display.toml".to_string(),
            default_mode: Mode::Day,
        }
    }
}

fn default_mode() -> Mode {
    Mode::Day
}

/// Fixed UTC day boundaries used for day/night switching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SunConfig {
    /// `HH:MM`, UTC.
    pub sunrise: String,
    /// `HH:MM`, UTC.
    pub sunset: String,
    #[serde(default = "default_twilight")]
    pub twilight_minutes: u32,
}

fn default_twilight() -> u32 {
    30
}

impl Default for SunConfig {
    fn default() -> Self {
        Self {
            sunrise: "06:00".to_string(),
            sunset: "18:00".to_string(),
            twilight_minutes: default_twilight(),
        }
    }
}

impl SunConfig {
    pub fn schedule(&self) -> Result<FixedSchedule> {
        let parse = |field: &str, value: &str| {
            NaiveTime::parse_from_str(value, "%H:%M")
                .map_err(|e| anyhow!("Invalid sun.{} '{}': {}", field, value, e))
        };
        let sunrise = parse("sunrise", &self.sunrise)?;
        let sunset = parse("sunset", &self.sunset)?;
        if sunrise >= sunset {
            bail!("sun.sunrise ({}) must be before sun.sunset ({})", self.sunrise, self.sunset);
        }
        Ok(FixedSchedule {
            sunrise,
            sunset,
            twilight_minutes: self.twilight_minutes,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Switch day/night from the vessel position.
    #[serde(default = "default_true")]
    pub auto_night_mode: bool,
    #[serde(default = "default_night_dim")]
    pub night_dim: u8,
    #[serde(default = "default_day_dim")]
    pub day_dim: u8,
    /// Seconds between automatic page changes; 0 disables.
    #[serde(default)]
    pub advance_pages: u64,
    /// Seconds a manual page change holds off automatic paging.
    #[serde(default = "default_advance_page_pause")]
    pub advance_page_pause: u64,
    /// Seconds without touch before the panel sleeps; 0 disables.
    #[serde(default)]
    pub sleep_timeout: u32,
    #[serde(default = "default_true")]
    pub wake_on_touch: bool,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_true() -> bool {
    true
}

fn default_night_dim() -> u8 {
    33
}

fn default_day_dim() -> u8 {
    100
}

fn default_advance_page_pause() -> u64 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    1000
}

impl DeviceConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
            auto_night_mode: true,
            night_dim: default_night_dim(),
            day_dim: default_day_dim(),
            advance_pages: 0,
            advance_page_pause: default_advance_page_pause(),
            sleep_timeout: 0,
            wake_on_touch: true,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }

    pub fn session_settings(&self, default_mode: Mode) -> SessionSettings {
        SessionSettings {
            auto_mode: self.auto_night_mode,
            default_mode,
            day_dim: self.day_dim,
            night_dim: self.night_dim,
            sleep_timeout: self.sleep_timeout,
            wake_on_touch: self.wake_on_touch,
            advance_pages: Duration::from_secs(self.advance_pages),
            advance_page_pause: Duration::from_secs(self.advance_page_pause),
        }
    }

    pub fn timing(&self) -> DeviceTiming {
        DeviceTiming {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            bail!("No devices configured; add at least one [[devices]] table");
        }
        for (index, device) in self.devices.iter().enumerate() {
            if device.port.trim().is_empty() {
                bail!("devices[{}]: port must not be empty", index);
            }
            if device.baud_rate == 0 {
                bail!("devices[{}]: baud_rate must be positive", index);
            }
            if device.night_dim > 100 || device.day_dim > 100 {
                bail!("devices[{}]: dim levels must be between 0 and 100", index);
            }
        }
        self.sun.schedule()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("nextion-bridge.log".to_string()),
            },
            display: DisplayConfig::default(),
            sun: SunConfig::default(),
            devices: vec![DeviceConfig::new("/dev/ttyUSB0")],
        }
    }
}
