use std::io::Write;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::core::console::LogSink;
use crate::core::device::SerialDevice;
use crate::core::failure::{ClassifiedError, ExceptionSender};
use crate::core::signal::TerminationSignal;
use crate::core::BUF_SIZE;

/// Device to console pump.
///
/// Parks in [`SerialDevice::wait_for_data`]; only `cancel_pending` on the
/// device gets it out of there when the other side stops first.
pub struct ReceivePump {
    device: Arc<dyn SerialDevice>,
    output: Box<dyn Write + Send>,
    log: Option<Arc<dyn LogSink>>,
    signal: Arc<TerminationSignal>,
    errors: ExceptionSender,
}

impl ReceivePump {
    pub fn new(
        device: Arc<dyn SerialDevice>,
        output: Box<dyn Write + Send>,
        signal: Arc<TerminationSignal>,
        errors: ExceptionSender,
    ) -> Self {
        Self {
            device,
            output,
            log: None,
            signal,
            errors,
        }
    }

    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn run(mut self) {
        if let Err(error) = self.pump() {
            self.report(error);
        }
    }

    fn pump(&mut self) -> Result<(), ClassifiedError> {
        let mut buf = [0u8; BUF_SIZE];

        while !self.signal.is_set() {
            self.device
                .wait_for_data()
                .map_err(|e| ClassifiedError::device(&e, "Wait for serial data"))?;

            let mut remaining = self
                .device
                .bytes_to_read()
                .map_err(|e| ClassifiedError::device(&e, "Query serial input queue"))?;
            while remaining > 0 {
                let want = remaining.min(buf.len());
                let n = self
                    .device
                    .read(&mut buf[..want])
                    .map_err(|e| ClassifiedError::device(&e, "Read from serial device"))?;
                if n == 0 {
                    break;
                }
                self.deliver(&buf[..n])?;
                remaining -= n.min(remaining);
            }
        }
        Ok(())
    }

    fn deliver(&mut self, chunk: &[u8]) -> Result<(), ClassifiedError> {
        trace!("Received {} bytes: {}", chunk.len(), hex::encode(chunk));

        self.output
            .write_all(chunk)
            .and_then(|_| self.output.flush())
            .map_err(|e| ClassifiedError::generic(&e, "Write to console"))?;

        if let Some(log) = &self.log {
            log.write_bytes(chunk)
                .map_err(|e| ClassifiedError::generic(&e, "Write to log"))?;
        }
        Ok(())
    }

    fn report(&self, mut error: ClassifiedError) {
        let first = self.signal.set();
        if error.is_cancellation || !first {
            error = error.into_cancellation();
            debug!("Receive pump stopped: {}", error);
        } else {
            warn!("Receive pump failed: {}", error);
        }
        self.errors.push(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::failure::{codes, ErrorOrigin, ExceptionQueue};
    use crate::core::testing::{DeviceStep, FakeDevice, MemoryLog, SharedOutput};
    use std::thread;
    use std::time::Duration;

    fn spawn(
        device: Arc<FakeDevice>,
        output: SharedOutput,
        log: Option<Arc<MemoryLog>>,
    ) -> (thread::JoinHandle<()>, Arc<TerminationSignal>, ExceptionQueue) {
        let signal = Arc::new(TerminationSignal::new());
        let queue = ExceptionQueue::new();
        let mut pump = ReceivePump::new(device, Box::new(output), Arc::clone(&signal), queue.sender());
        if let Some(log) = log {
            pump = pump.with_log(log);
        }
        (thread::spawn(move || pump.run()), signal, queue)
    }

    #[test]
    fn test_data_reaches_console_and_log() {
        let device = Arc::new(FakeDevice::new(vec![
            DeviceStep::Data(b"login: ".to_vec()),
            DeviceStep::Data(vec![b'x'; BUF_SIZE + 10]),
        ]));
        let output = SharedOutput::default();
        let log = Arc::new(MemoryLog::default());
        let (handle, signal, queue) = spawn(Arc::clone(&device), output.clone(), Some(log.clone()));

        while output.contents().len() < 7 + BUF_SIZE + 10 {
            thread::yield_now();
        }
        signal.set();
        device.cancel_pending();
        handle.join().unwrap();

        let mut expected = b"login: ".to_vec();
        expected.extend(vec![b'x'; BUF_SIZE + 10]);
        assert_eq!(output.contents(), expected);
        assert_eq!(log.contents(), expected);

        // Cancelled wait is an artifact of shutdown.
        let errors = queue.drain();
        assert!(errors.iter().all(|e| e.is_cancellation));
    }

    #[test]
    fn test_cancel_while_idle_is_silent() {
        let device = Arc::new(FakeDevice::idle());
        let (handle, signal, queue) = spawn(Arc::clone(&device), SharedOutput::default(), None);

        thread::sleep(Duration::from_millis(20));
        device.cancel_pending();
        handle.join().unwrap();

        assert!(signal.is_set());
        // One parked wait, no retry after the cancel.
        assert_eq!(device.waits(), 1);
        let errors = queue.drain();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_cancellation);
        assert_eq!(errors[0].origin, ErrorOrigin::DeviceIo);
    }

    #[test]
    fn test_device_failure_sets_signal() {
        let device = Arc::new(FakeDevice::new(vec![
            DeviceStep::Data(b"bye".to_vec()),
            DeviceStep::Fail(codes::DEVICE_REMOVED),
        ]));
        let output = SharedOutput::default();
        let (handle, signal, queue) = spawn(device, output.clone(), None);

        handle.join().unwrap();

        assert!(signal.is_set());
        assert_eq!(output.contents(), b"bye");
        let errors = queue.drain();
        assert_eq!(errors.len(), 1);
        assert!(!errors[0].is_cancellation);
        assert!(errors[0].is_detach());
    }

    #[test]
    fn test_failure_after_stop_is_cancellation() {
        let device = Arc::new(FakeDevice::new(vec![DeviceStep::Fail(codes::ACCESS_DENIED)]));
        let signal = Arc::new(TerminationSignal::new());
        let queue = ExceptionQueue::new();
        let pump = ReceivePump::new(
            device,
            Box::new(SharedOutput::default()),
            Arc::clone(&signal),
            queue.sender(),
        );

        // Stopped between the loop check and the device wait.
        let mut pump = pump;
        let error = pump.pump().unwrap_err();
        signal.set();
        pump.report(error);

        let errors = queue.drain();
        assert!(errors[0].is_cancellation);
    }
}
