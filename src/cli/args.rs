use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::domain::config::{
    ComTermConfig, FlowControlConfig, ParityConfig, SessionConfig, StopBitsConfig,
};
use crate::domain::error::ComTermResult;

/// Command line arguments for ComTerm
#[derive(Parser, Debug)]
#[command(
    name = "comterm",
    version = env!("CARGO_PKG_VERSION"),
    about = "Interactive terminal for serial devices",
    long_about = "Connects the terminal to a serial device in both directions, with optional transcript logging, resize forwarding and automatic reconnection. Press F1 to leave a session."
)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Write diagnostics to this file instead of stderr
    #[arg(long, global = true)]
    pub trace_file: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open an interactive session on a serial port
    Connect(ConnectArgs),
    /// List available serial ports
    List,
    /// Configuration management commands
    Config(ConfigArgs),
    /// Display version information
    Version,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
    /// Table output
    Table,
}

/// Serial session arguments. Unset options fall back to the configuration file.
#[derive(ClapArgs, Debug, Default)]
pub struct ConnectArgs {
    /// Serial port, e.g. COM3 or /dev/ttyUSB0
    pub port: String,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Data bits (5-8)
    #[arg(long)]
    pub data_bits: Option<u8>,

    /// Stop bits
    #[arg(long, value_enum)]
    pub stop_bits: Option<StopBitsArg>,

    /// Parity
    #[arg(long, value_enum)]
    pub parity: Option<ParityArg>,

    /// Flow control
    #[arg(long, value_enum)]
    pub flow_control: Option<FlowControlArg>,

    /// Forward terminal resizes to the device
    #[arg(long)]
    pub resize: bool,

    /// Append everything received to this file
    #[arg(short, long)]
    pub log_file: Option<PathBuf>,

    /// Log typed keys as well
    #[arg(long, requires = "log_file")]
    pub stdin_logging: bool,

    /// Reconnect when the device goes away
    #[arg(long)]
    pub auto_reconnect: bool,

    /// Do not report errors caused by unplugging the device while reconnecting
    #[arg(long, requires = "auto_reconnect")]
    pub allow_detach: bool,

    /// Seconds to wait before looking for the device again
    #[arg(long, value_name = "SECS")]
    pub reconnect_pause: Option<u64>,

    /// Seconds to look for the device before giving up
    #[arg(long, value_name = "SECS")]
    pub reconnect_timeout: Option<u64>,

    /// Pipe stdin/stdout to the device without any translation
    #[arg(long, conflicts_with_all = ["auto_reconnect", "resize"])]
    pub batch: bool,
}

impl ConnectArgs {
    /// Overlay these options on the stored defaults and validate the result.
    pub fn into_session_config(self, defaults: &ComTermConfig) -> ComTermResult<SessionConfig> {
        let mut config = SessionConfig::from_defaults(self.port, defaults);

        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(data_bits) = self.data_bits {
            config.serial.data_bits = data_bits;
        }
        if let Some(stop_bits) = self.stop_bits {
            config.serial.stop_bits = stop_bits.into();
        }
        if let Some(parity) = self.parity {
            config.serial.parity = parity.into();
        }
        if let Some(flow_control) = self.flow_control {
            config.serial.flow_control = flow_control.into();
        }

        config.resize_tracking |= self.resize;
        config.stdin_logging |= self.stdin_logging;
        config.allow_detach |= self.allow_detach;
        config.reconnect.enabled |= self.auto_reconnect;
        if self.log_file.is_some() {
            config.log_file = self.log_file;
        }
        if let Some(pause) = self.reconnect_pause {
            config.reconnect.pause_secs = pause;
        }
        if let Some(timeout) = self.reconnect_timeout {
            config.reconnect.timeout_secs = timeout;
        }
        if self.batch {
            config.batch = true;
            config.reconnect.enabled = false;
            config.resize_tracking = false;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Configuration management arguments
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    /// Configuration subcommand
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,
    /// Create default configuration
    Init,
}

/// Parity configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ParityArg {
    None,
    Even,
    Odd,
}

/// Stop bits configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum StopBitsArg {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

/// Flow control configuration argument
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum FlowControlArg {
    None,
    Software,
    Hardware,
}

impl From<ParityArg> for ParityConfig {
    fn from(parity: ParityArg) -> Self {
        match parity {
            ParityArg::None => Self::None,
            ParityArg::Even => Self::Even,
            ParityArg::Odd => Self::Odd,
        }
    }
}

impl From<StopBitsArg> for StopBitsConfig {
    fn from(stop_bits: StopBitsArg) -> Self {
        match stop_bits {
            StopBitsArg::One => Self::One,
            StopBitsArg::Two => Self::Two,
        }
    }
}

impl From<FlowControlArg> for FlowControlConfig {
    fn from(flow_control: FlowControlArg) -> Self {
        match flow_control {
            FlowControlArg::None => Self::None,
            FlowControlArg::Software => Self::Software,
            FlowControlArg::Hardware => Self::Hardware,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Table => write!(f, "table"),
        }
    }
}
