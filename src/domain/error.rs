use thiserror::Error;

use crate::core::failure::ClassifiedError;

/// ComTerm unified error type
#[derive(Error, Debug)]
pub enum ComTermError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Open serial connection {port}: {source}")]
    DeviceOpen {
        port: String,
        #[source]
        source: ClassifiedError,
    },

    #[error("Device scan error: {message}")]
    DeviceScan { message: String },

    #[error("Serial device {port} is not available")]
    DeviceNotAvailable { port: String },

    #[error("Console error: {0}")]
    Console(ClassifiedError),

    #[error("Session error: {0}")]
    Session(ClassifiedError),

    #[error("Output error: {0}")]
    Output(String),
}

pub type ComTermResult<T> = Result<T, ComTermError>;

/// Process exit codes reported at the CLI boundary.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const CONFIG: i32 = 2;
    pub const DEVICE_OPEN: i32 = 3;
    pub const DEVICE_SCAN: i32 = 4;
    pub const RUNTIME_IO: i32 = 5;
}

impl ComTermError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ComTermError::Config { .. } => exit_code::CONFIG,
            ComTermError::DeviceOpen { .. } => exit_code::DEVICE_OPEN,
            ComTermError::DeviceScan { .. } | ComTermError::DeviceNotAvailable { .. } => {
                exit_code::DEVICE_SCAN
            }
            ComTermError::Io(_)
            | ComTermError::Console(_)
            | ComTermError::Session(_)
            | ComTermError::Output(_) => exit_code::RUNTIME_IO,
        }
    }
}
