use crate::cli::args::OutputFormat;
use crate::core::device::DeviceMap;
use crate::core::failure::{ClassifiedError, ErrorOrigin};
use crate::core::session::ErrorReporter;
use crate::domain::config::ComTermConfig;
use serde::Serialize;
use std::io::{self, Write};
use tabled::{Table, Tabled};

/// Output writer trait for different formats
pub trait OutputWriter {
    fn write_devices(&self, devices: &DeviceMap) -> Result<(), OutputError>;
    fn write_config(&self, config: &ComTermConfig) -> Result<(), OutputError>;
    fn write_message(&self, message: &str) -> Result<(), OutputError>;
    fn write_error(&self, error: &str) -> Result<(), OutputError>;
}

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for crate::domain::error::ComTermError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    fn render_devices(&self, devices: &DeviceMap) -> Result<String, OutputError> {
        let rows: Vec<DeviceRow> = devices
            .iter()
            .map(|(port, description)| DeviceRow {
                port: port.clone(),
                description: description.clone(),
            })
            .collect();

        Ok(match self.format {
            OutputFormat::Text => rows
                .iter()
                .map(|row| format!("{}: {}\n", row.port, row.description))
                .collect(),
            OutputFormat::Json => serde_json::to_string_pretty(&rows)?,
            OutputFormat::Table => Table::new(rows).to_string(),
        })
    }

    fn render_config(&self, config: &ComTermConfig) -> Result<String, OutputError> {
        Ok(match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(config)?,
            OutputFormat::Text | OutputFormat::Table => toml::to_string_pretty(config)?,
        })
    }
}

impl OutputWriter for ConsoleWriter {
    fn write_devices(&self, devices: &DeviceMap) -> Result<(), OutputError> {
        let rendered = self.render_devices(devices)?;
        let mut stdout = io::stdout();
        write!(stdout, "{}", rendered)?;
        if !rendered.ends_with('\n') {
            writeln!(stdout)?;
        }
        Ok(())
    }

    fn write_config(&self, config: &ComTermConfig) -> Result<(), OutputError> {
        println!("{}", self.render_config(config)?);
        Ok(())
    }

    fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "message": message,
                    "level": "info"
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                println!("{}", message);
            }
        }
        Ok(())
    }

    fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "error": error,
                    "level": "error"
                });
                eprintln!("{}", serde_json::to_string_pretty(&output)?);
            }
            _ => {
                eprintln!("Error: {}", error);
            }
        }
        Ok(())
    }
}

/// Table row for a detected serial port
#[derive(Tabled, Serialize)]
struct DeviceRow {
    port: String,
    description: String,
}

/// Prints surfaced session failures to stderr.
///
/// Device failures read like `Serial device error: <message>`, the rest
/// keep their own context prefix.
pub struct StderrReporter {
    format: OutputFormat,
}

impl StderrReporter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

/// One line per failure, with the OS code.
pub fn describe_failure(error: &ClassifiedError) -> String {
    match error.origin {
        ErrorOrigin::DeviceIo => format!("Serial device error: {} ({})", error.message, error.code),
        ErrorOrigin::Generic => format!("{} ({})", error.message, error.code),
    }
}

impl ErrorReporter for StderrReporter {
    fn report(&self, errors: &[ClassifiedError]) {
        let writer = ConsoleWriter::new(self.format);
        for error in errors {
            if let Err(e) = writer.write_error(&describe_failure(error)) {
                tracing::debug!("Could not report session failure: {}", e);
            }
        }
    }
}
