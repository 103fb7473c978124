use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::core::console::LogSink;
use crate::domain::error::{ComTermError, ComTermResult};

/// Session transcript appended to a file.
///
/// Writes go straight to the file without user-space buffering, so the
/// transcript survives a crash up to the last byte received.
pub struct LogWriter {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogWriter {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> ComTermResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ComTermError::config(format!("Open log file {}: {}", path.display(), e)))?;

        debug!("Logging session to {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for LogWriter {
    fn write_bytes(&self, data: &[u8]) -> io::Result<()> {
        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        file.write_all(data)
    }
}
