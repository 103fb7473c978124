use tracing::{debug, trace};

use crate::core::device::WriteSink;
use crate::core::failure::ClassifiedError;

/// Buffers bytes for the device and sends them as one write at a time.
///
/// At most one write is in flight. Touching the buffer first waits for the
/// previous write, which is the only back-pressure there is.
/// Not thread safe: owned by the send pump alone.
pub struct AsyncWriter {
    sink: Box<dyn WriteSink>,
    buf: Vec<u8>,
    capacity: usize,
    pending: bool,
    shutdown: bool,
    flushes: u64,
}

impl AsyncWriter {
    pub fn new(sink: Box<dyn WriteSink>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            sink,
            buf: Vec::with_capacity(capacity),
            capacity,
            pending: false,
            shutdown: false,
            flushes: 0,
        }
    }

    /// Append one byte, flushing when the buffer becomes full.
    pub fn put(&mut self, byte: u8) -> Result<(), ClassifiedError> {
        self.await_pending()?;
        self.buf.push(byte);
        if self.buf.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    /// Append a pre-built sequence, flushing once the copy fills the buffer.
    pub fn put_bulk(&mut self, data: &[u8]) -> Result<(), ClassifiedError> {
        self.await_pending()?;
        self.buf.extend_from_slice(data);
        if self.buf.len() >= self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    /// Issue the buffered bytes as a single write without waiting for it.
    pub fn flush(&mut self) -> Result<(), ClassifiedError> {
        if self.buf.is_empty() {
            return Ok(());
        }

        self.await_pending()?;
        trace!("Writing {} bytes to serial device", self.buf.len());
        self.sink
            .begin_write(&self.buf)
            .map_err(|e| ClassifiedError::device(&e, "Write to serial device"))?;
        self.pending = true;
        self.flushes += 1;
        self.buf.clear();
        Ok(())
    }

    /// Stop accepting writes and wait until everything buffered is out.
    pub fn shutdown(&mut self) -> Result<(), ClassifiedError> {
        if self.shutdown {
            return Ok(());
        }
        self.shutdown = true;
        self.flush()?;
        self.await_pending()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Number of writes issued so far.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn await_pending(&mut self) -> Result<(), ClassifiedError> {
        if self.pending {
            self.pending = false;
            self.sink
                .wait_complete()
                .map_err(|e| ClassifiedError::device(&e, "Wait for serial write"))?;
        }
        Ok(())
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            debug!("Serial writer dropped with undelivered data: {}", e);
        }
    }
}
