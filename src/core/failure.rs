//! Failure classification shared by the pump threads.
//!
//! Pumps never unwind across threads. Each failure is captured as a
//! [`ClassifiedError`] tagged with where it came from, pushed onto the
//! session's [`ExceptionQueue`], and triaged by the orchestrator once both
//! pumps have stopped.

use std::fmt;
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};

use thiserror::Error;
use tracing::warn;

/// OS error codes the redirector cares about.
#[cfg(windows)]
pub mod codes {
    pub const ACCESS_DENIED: i32 = 5;
    pub const BAD_COMMAND: i32 = 22;
    pub const OPERATION_ABORTED: i32 = 995;
    pub const DEVICE_REMOVED: i32 = 1617;

    pub(crate) const DETACH: &[i32] = &[ACCESS_DENIED, BAD_COMMAND, DEVICE_REMOVED];
}

/// OS error codes the redirector cares about.
#[cfg(not(windows))]
pub mod codes {
    pub const ACCESS_DENIED: i32 = 13; // EACCES
    pub const BAD_COMMAND: i32 = 25; // ENOTTY
    pub const OPERATION_ABORTED: i32 = 125; // ECANCELED
    pub const DEVICE_REMOVED: i32 = 19; // ENODEV

    // Unplugged USB adapters surface as EIO or ENXIO on read.
    const IO_ERROR: i32 = 5;
    const NO_SUCH_DEVICE_OR_ADDRESS: i32 = 6;

    pub(crate) const DETACH: &[i32] = &[
        ACCESS_DENIED,
        BAD_COMMAND,
        DEVICE_REMOVED,
        IO_ERROR,
        NO_SUCH_DEVICE_OR_ADDRESS,
    ];
}

/// Code used when a failure carries no OS error number.
pub const UNKNOWN_CODE: i32 = -1;

/// Which layer a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// Console or OS layer (handles, threads, log file)
    Generic,
    /// The serial transport itself
    DeviceIo,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorOrigin::Generic => write!(f, "generic"),
            ErrorOrigin::DeviceIo => write!(f, "device"),
        }
    }
}

/// A failure captured at the point it happened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct ClassifiedError {
    pub code: i32,
    pub message: String,
    pub origin: ErrorOrigin,
    pub is_cancellation: bool,
}

impl ClassifiedError {
    pub fn new(code: i32, message: impl Into<String>, origin: ErrorOrigin) -> Self {
        Self {
            code,
            message: message.into(),
            origin,
            is_cancellation: false,
        }
    }

    /// Wrap an I/O error raised by the serial transport.
    pub fn device(err: &io::Error, context: &str) -> Self {
        Self::from_io(err, context, ErrorOrigin::DeviceIo)
    }

    /// Wrap an I/O error raised by the console or OS layer.
    pub fn generic(err: &io::Error, context: &str) -> Self {
        Self::from_io(err, context, ErrorOrigin::Generic)
    }

    fn from_io(err: &io::Error, context: &str, origin: ErrorOrigin) -> Self {
        let code = err
            .raw_os_error()
            .or_else(|| carried_code(err))
            .unwrap_or_else(|| kind_code(err.kind()));
        Self {
            code,
            message: format!("{}: {}", context, err),
            origin,
            is_cancellation: code == codes::OPERATION_ABORTED,
        }
    }

    /// Mark this failure as the expected artifact of a shutdown.
    pub fn into_cancellation(mut self) -> Self {
        self.is_cancellation = true;
        self
    }

    /// True for the codes that mean the peripheral went away.
    pub fn is_detach(&self) -> bool {
        self.origin == ErrorOrigin::DeviceIo && codes::DETACH.contains(&self.code)
    }
}

// serialport reports some failures without an OS error number.
fn kind_code(kind: io::ErrorKind) -> i32 {
    match kind {
        io::ErrorKind::PermissionDenied => codes::ACCESS_DENIED,
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => codes::DEVICE_REMOVED,
        _ => UNKNOWN_CODE,
    }
}

/// An OS code attached to an I/O error by a binding whose library does
/// not keep `raw_os_error`.
#[derive(Error, Debug)]
#[error("{message}")]
struct CodedError {
    code: i32,
    message: String,
}

/// Build an I/O error that classifies as `code`.
pub fn coded(code: i32, message: impl Into<String>) -> io::Error {
    io::Error::new(
        io::ErrorKind::Other,
        CodedError {
            code,
            message: message.into(),
        },
    )
}

fn carried_code(err: &io::Error) -> Option<i32> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<CodedError>())
        .map(|coded| coded.code)
}

/// The error raised by a wait that was cancelled from another thread.
pub fn operation_aborted() -> io::Error {
    io::Error::from_raw_os_error(codes::OPERATION_ABORTED)
}

pub fn is_operation_aborted(err: &io::Error) -> bool {
    err.raw_os_error() == Some(codes::OPERATION_ABORTED)
}

/// Multi-producer queue collecting pump failures for one session.
pub struct ExceptionQueue {
    tx: Sender<ClassifiedError>,
    rx: Receiver<ClassifiedError>,
}

/// Producer handle given to a pump thread.
#[derive(Clone)]
pub struct ExceptionSender {
    tx: Sender<ClassifiedError>,
}

impl ExceptionQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> ExceptionSender {
        ExceptionSender {
            tx: self.tx.clone(),
        }
    }

    /// Take every queued failure in arrival order.
    pub fn drain(&self) -> Vec<ClassifiedError> {
        self.rx.try_iter().collect()
    }
}

impl Default for ExceptionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ExceptionSender {
    pub fn push(&self, error: ClassifiedError) {
        // The receiver lives in the redirector, which outlives both pumps.
        if let Err(e) = self.tx.send(error) {
            warn!("Dropped pump failure, queue closed: {}", e.0);
        }
    }
}
