//! Seams between the redirector and the serial transport.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::core::failure::ClassifiedError;
use crate::domain::config::SerialParams;
use crate::domain::error::ComTermResult;

/// A serial device shared by the receive pump (reads) and the send pump
/// (writes through its own [`WriteSink`]).
pub trait SerialDevice: Send + Sync {
    /// Block until received bytes are queued at the device.
    ///
    /// Returns the operation-aborted error once [`cancel_pending`] has been
    /// called, including when the caller is already parked in the wait.
    ///
    /// [`cancel_pending`]: SerialDevice::cancel_pending
    fn wait_for_data(&self) -> io::Result<()>;

    /// Number of bytes that can be read without blocking.
    fn bytes_to_read(&self) -> io::Result<usize>;

    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Force any pending or future wait on this device to return.
    fn cancel_pending(&self);

    /// Open the write side used by exactly one writer.
    fn open_writer(&self) -> io::Result<Box<dyn WriteSink>>;
}

/// Write side of the device with split issue/complete steps.
///
/// Callers must not call [`begin_write`] again before [`wait_complete`]
/// returned for the previous write.
///
/// [`begin_write`]: WriteSink::begin_write
/// [`wait_complete`]: WriteSink::wait_complete
pub trait WriteSink: Send {
    /// Hand `data` to the device without waiting for it to go out.
    fn begin_write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Block until the last write has completed.
    fn wait_complete(&mut self) -> io::Result<()>;
}

/// Port name to human readable description.
pub type DeviceMap = BTreeMap<String, String>;

/// Opens and configures a serial device.
pub trait DeviceOpener {
    fn open(&self, port: &str, params: &SerialParams) -> Result<Arc<dyn SerialDevice>, ClassifiedError>;
}

/// Enumerates serial devices present on the system.
pub trait DeviceScanner {
    fn scan_devices(&self) -> ComTermResult<DeviceMap>;

    /// Poll roughly once per second until `port` shows up or `timeout` elapses.
    /// Returns an empty map on timeout.
    fn wait_for_device(&self, port: &str, timeout: Duration) -> ComTermResult<DeviceMap>;
}
