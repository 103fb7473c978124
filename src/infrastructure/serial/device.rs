use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info};

use crate::core::device::{DeviceOpener, SerialDevice, WriteSink};
use crate::core::failure::{codes, coded, operation_aborted, ClassifiedError, ErrorOrigin};
use crate::domain::config::{FlowControlConfig, ParityConfig, SerialParams, StopBitsConfig};

/// How long one read blocks before the cancel flag is checked again.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often `wait_complete` looks at the transmit queue.
const DRAIN_POLL: Duration = Duration::from_millis(10);

struct ReadSide {
    port: Box<dyn SerialPort>,
    /// Byte consumed while waiting for data, handed out by the next read
    peeked: Option<u8>,
}

/// A port opened through `serialport`.
///
/// The port has no notification for "data arrived", so the wait is a read
/// with a short timeout that re-checks the cancel flag between attempts.
pub struct SerialPortDevice {
    name: String,
    read_side: Mutex<ReadSide>,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    /// Shared with the sink so a stalled write gives up too
    cancelled: Arc<AtomicBool>,
}

impl SerialPortDevice {
    fn new(name: String, port: Box<dyn SerialPort>) -> io::Result<Self> {
        let writer = port.try_clone().map_err(port_error)?;
        Ok(Self {
            name,
            read_side: Mutex::new(ReadSide { port, peeked: None }),
            writer: Mutex::new(Some(writer)),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn read_side(&self) -> MutexGuard<'_, ReadSide> {
        match self.read_side.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_cancelled(&self) -> io::Result<()> {
        check_cancelled(&self.cancelled)
    }
}

fn check_cancelled(cancelled: &AtomicBool) -> io::Result<()> {
    if cancelled.load(Ordering::Acquire) {
        return Err(operation_aborted());
    }
    Ok(())
}

/// `serialport` drops the OS error number, so an open port's failures are
/// mapped back to the codes the session triage understands.
fn port_error(err: serialport::Error) -> io::Error {
    use serialport::ErrorKind;

    match err.kind {
        ErrorKind::Io(kind @ (io::ErrorKind::TimedOut | io::ErrorKind::Interrupted)) => {
            io::Error::new(kind, err.description)
        }
        ErrorKind::Io(io::ErrorKind::PermissionDenied) => coded(codes::ACCESS_DENIED, err.description),
        ErrorKind::InvalidInput => coded(codes::BAD_COMMAND, err.description),
        ErrorKind::NoDevice | ErrorKind::Io(_) | ErrorKind::Unknown => {
            coded(codes::DEVICE_REMOVED, err.description)
        }
    }
}

/// A read or write on an open port that failed without an OS code means
/// the line hung up.
fn port_fault(err: io::Error) -> io::Error {
    if err.raw_os_error().is_some() {
        return err;
    }
    match err.kind() {
        io::ErrorKind::PermissionDenied => coded(codes::ACCESS_DENIED, err.to_string()),
        _ => coded(codes::DEVICE_REMOVED, err.to_string()),
    }
}

fn hangup() -> io::Error {
    coded(codes::DEVICE_REMOVED, "serial line hung up")
}

impl SerialDevice for SerialPortDevice {
    fn wait_for_data(&self) -> io::Result<()> {
        loop {
            self.check_cancelled()?;

            let mut side = self.read_side();
            if side.peeked.is_some() || side.port.bytes_to_read().map_err(port_error)? > 0 {
                return Ok(());
            }

            let mut byte = [0u8; 1];
            match side.port.read(&mut byte) {
                Ok(1) => {
                    side.peeked = Some(byte[0]);
                    return Ok(());
                }
                // A timed read reports a timeout, so end of file is a hangup.
                Ok(_) => return Err(hangup()),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(port_fault(e)),
            }
        }
    }

    fn bytes_to_read(&self) -> io::Result<usize> {
        let side = self.read_side();
        let queued = side.port.bytes_to_read().map_err(port_error)? as usize;
        Ok(queued + usize::from(side.peeked.is_some()))
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut side = self.read_side();
        let mut filled = 0;
        if let Some(byte) = side.peeked.take() {
            buf[0] = byte;
            filled = 1;
        }
        if filled < buf.len() && side.port.bytes_to_read().map_err(port_error)? > 0 {
            match side.port.read(&mut buf[filled..]) {
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut && filled > 0 => {}
                Err(e) => return Err(port_fault(e)),
            }
        }
        Ok(filled)
    }

    fn cancel_pending(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn open_writer(&self) -> io::Result<Box<dyn WriteSink>> {
        let mut slot = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let port = slot.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::AlreadyExists, "serial writer already opened")
        })?;
        Ok(Box::new(SerialPortSink {
            port,
            cancelled: Arc::clone(&self.cancelled),
        }))
    }
}

/// Write half of a [`SerialPortDevice`], on its own cloned handle.
///
/// With flow control the peer can hold the line indefinitely, so both
/// steps give up with the operation-aborted error once the device is
/// cancelled.
pub struct SerialPortSink {
    port: Box<dyn SerialPort>,
    cancelled: Arc<AtomicBool>,
}

impl WriteSink for SerialPortSink {
    fn begin_write(&mut self, mut data: &[u8]) -> io::Result<()> {
        // The OS buffers the bytes; only a full transmit queue blocks here.
        while !data.is_empty() {
            match self.port.write(data) {
                Ok(0) => return Err(hangup()),
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::TimedOut => check_cancelled(&self.cancelled)?,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(port_fault(e)),
            }
        }
        Ok(())
    }

    fn wait_complete(&mut self) -> io::Result<()> {
        loop {
            check_cancelled(&self.cancelled)?;
            if self.port.bytes_to_write().map_err(port_error)? == 0 {
                return Ok(());
            }
            thread::sleep(DRAIN_POLL);
        }
    }
}

/// Opens ports with the line settings of a session.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

impl SerialPortOpener {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceOpener for SerialPortOpener {
    fn open(&self, port: &str, params: &SerialParams) -> Result<Arc<dyn SerialDevice>, ClassifiedError> {
        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => {
                return Err(ClassifiedError::new(
                    codes::BAD_COMMAND,
                    format!("Invalid data bits: {}", other),
                    ErrorOrigin::DeviceIo,
                ))
            }
        };

        let mut handle = serialport::new(port, params.baud_rate)
            .data_bits(data_bits)
            .parity(match params.parity {
                ParityConfig::None => serialport::Parity::None,
                ParityConfig::Odd => serialport::Parity::Odd,
                ParityConfig::Even => serialport::Parity::Even,
            })
            .stop_bits(match params.stop_bits {
                StopBitsConfig::One => serialport::StopBits::One,
                StopBitsConfig::Two => serialport::StopBits::Two,
            })
            .flow_control(match params.flow_control {
                FlowControlConfig::None => serialport::FlowControl::None,
                FlowControlConfig::Software => serialport::FlowControl::Software,
                FlowControlConfig::Hardware => serialport::FlowControl::Hardware,
            })
            .timeout(POLL_INTERVAL)
            .open()
            .map_err(|e| open_error(&e))?;

        if params.flow_control != FlowControlConfig::Hardware {
            if let Err(e) = handle.write_data_terminal_ready(true) {
                debug!("Could not assert DTR on {}: {}", port, e);
            }
            if let Err(e) = handle.write_request_to_send(true) {
                debug!("Could not assert RTS on {}: {}", port, e);
            }
        }
        if let Err(e) = handle.clear(ClearBuffer::All) {
            debug!("Could not purge buffers of {}: {}", port, e);
        }

        let device = SerialPortDevice::new(port.to_string(), handle)
            .map_err(|e| ClassifiedError::device(&e, "Clone serial handle"))?;
        info!(
            "Opened {} at {} baud, {} data bits, parity {:?}, stop bits {:?}",
            port, params.baud_rate, params.data_bits, params.parity, params.stop_bits
        );
        Ok(Arc::new(device))
    }
}

fn open_error(err: &serialport::Error) -> ClassifiedError {
    match err.kind() {
        serialport::ErrorKind::NoDevice => ClassifiedError::new(
            codes::DEVICE_REMOVED,
            format!("Open serial port: {}", err),
            ErrorOrigin::DeviceIo,
        ),
        _ => ClassifiedError::device(&io::Error::from(err.clone()), "Open serial port"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::failure::is_operation_aborted;
    use std::time::Instant;

    #[test]
    fn test_invalid_data_bits_rejected_before_open() {
        let params = SerialParams {
            data_bits: 9,
            ..SerialParams::default()
        };
        let error = SerialPortOpener::new()
            .open("/dev/does-not-exist", &params)
            .err()
            .unwrap();
        assert_eq!(error.origin, ErrorOrigin::DeviceIo);
        assert!(error.message.contains("data bits"));
    }

    #[test]
    fn test_missing_port_is_device_error() {
        let error = SerialPortOpener::new()
            .open("/dev/comterm-missing-port", &SerialParams::default())
            .err()
            .unwrap();
        assert_eq!(error.origin, ErrorOrigin::DeviceIo);
        assert!(!error.is_cancellation);
        assert!(error.message.starts_with("Open serial port"));
    }

    #[test]
    fn test_port_errors_keep_their_detach_meaning() {
        let gone = port_error(serialport::Error::new(serialport::ErrorKind::NoDevice, "gone"));
        assert!(ClassifiedError::device(&gone, "Query serial queue").is_detach());

        let unknown = port_error(serialport::Error::new(serialport::ErrorKind::Unknown, "I/O error"));
        assert!(ClassifiedError::device(&unknown, "Query serial queue").is_detach());

        let slow = port_error(serialport::Error::new(
            serialport::ErrorKind::Io(io::ErrorKind::TimedOut),
            "timed out",
        ));
        assert_eq!(slow.kind(), io::ErrorKind::TimedOut);
    }

    #[cfg(unix)]
    #[test]
    fn test_hangup_classifies_as_detach() {
        let (master, slave) = serialport::TTYPort::pair().unwrap();
        let device = SerialPortDevice::new("pty".to_string(), Box::new(slave)).unwrap();
        drop(master);

        let error = device.wait_for_data().unwrap_err();
        let classified = ClassifiedError::device(&error, "Wait for serial data");
        assert!(classified.is_detach(), "{:?}", classified);
        assert!(!classified.is_cancellation);
    }

    #[cfg(unix)]
    #[test]
    fn test_stalled_write_gives_up_once_cancelled() {
        // Nobody reads the master side, so the slave's queue fills up.
        let (_master, slave) = serialport::TTYPort::pair().unwrap();
        let device = Arc::new(SerialPortDevice::new("pty".to_string(), Box::new(slave)).unwrap());
        let mut sink = device.open_writer().unwrap();

        let canceller = {
            let device = Arc::clone(&device);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                device.cancel_pending();
            })
        };

        let started = Instant::now();
        let error = sink.begin_write(&vec![b'x'; 1 << 20]).unwrap_err();
        canceller.join().unwrap();

        assert!(is_operation_aborted(&error));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(is_operation_aborted(&sink.wait_complete().unwrap_err()));
    }
}
