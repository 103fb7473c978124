use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::error::{ComTermError, ComTermResult};

/// Persistent defaults stored in `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComTermConfig {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,
    /// Serial line defaults
    #[serde(default)]
    pub serial: SerialParams,
    /// Session feature defaults
    #[serde(default)]
    pub session: SessionDefaults,
    /// Reconnect defaults
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Feature flags applied to every session unless overridden
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default)]
    pub resize_tracking: bool,
    #[serde(default)]
    pub stdin_logging: bool,
    #[serde(default)]
    pub allow_detach: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// Serial line parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialParams {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default)]
    pub parity: ParityConfig,
    #[serde(default)]
    pub stop_bits: StopBitsConfig,
    #[serde(default)]
    pub flow_control: FlowControlConfig,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    #[default]
    None,
    Odd,
    Even,
}

/// Stop bits configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBitsConfig {
    #[default]
    One,
    Two,
}

/// Flow control configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControlConfig {
    #[default]
    None,
    Hardware,
    Software,
}

/// Reconnect policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Seconds to wait before scanning for the device again
    #[serde(default = "default_reconnect_pause")]
    pub pause_secs: u64,
    /// Seconds to keep scanning before giving up
    #[serde(default = "default_reconnect_timeout")]
    pub timeout_secs: u64,
}

/// Everything one connection attempt needs, fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Device identifier, e.g. `COM3` or `/dev/ttyUSB0`
    pub port: String,
    pub serial: SerialParams,
    /// Forward console resizes to the peer as resize frames
    pub resize_tracking: bool,
    /// Mirror typed keys into the log file as well
    pub stdin_logging: bool,
    /// Swallow "device went away" errors when reconnecting
    pub allow_detach: bool,
    pub log_file: Option<PathBuf>,
    pub reconnect: ReconnectPolicy,
    /// Plain byte pump without key or resize translation
    pub batch: bool,
}

// Default value functions
fn default_log_level() -> String {
    "warn".to_string()
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

fn default_reconnect_pause() -> u64 {
    3
}

fn default_reconnect_timeout() -> u64 {
    120
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: ParityConfig::default(),
            stop_bits: StopBitsConfig::default(),
            flow_control: FlowControlConfig::default(),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            pause_secs: default_reconnect_pause(),
            timeout_secs: default_reconnect_timeout(),
        }
    }
}

impl ReconnectPolicy {
    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SessionConfig {
    /// Build a session for `port` from the stored defaults.
    pub fn from_defaults(port: impl Into<String>, config: &ComTermConfig) -> Self {
        Self {
            port: port.into(),
            serial: config.serial.clone(),
            resize_tracking: config.session.resize_tracking,
            stdin_logging: config.session.stdin_logging,
            allow_detach: config.session.allow_detach,
            log_file: config.session.log_file.clone(),
            reconnect: config.reconnect.clone(),
            batch: false,
        }
    }

    pub fn validate(&self) -> ComTermResult<()> {
        if self.port.trim().is_empty() {
            return Err(ComTermError::config("Serial port must not be empty"));
        }
        if self.serial.baud_rate == 0 {
            return Err(ComTermError::config("Baud rate must be greater than zero"));
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return Err(ComTermError::config(format!(
                "Invalid data bits: {}",
                self.serial.data_bits
            )));
        }
        if self.stdin_logging && self.log_file.is_none() {
            return Err(ComTermError::config(
                "Stdin logging requires a log file",
            ));
        }
        if self.batch && self.reconnect.enabled {
            return Err(ComTermError::config(
                "Auto reconnect is not available in batch mode",
            ));
        }
        Ok(())
    }
}
