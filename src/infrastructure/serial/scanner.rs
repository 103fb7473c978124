use std::thread;
use std::time::{Duration, Instant};

use serialport::{SerialPortInfo, SerialPortType};
use tracing::{debug, trace};

use crate::core::device::{DeviceMap, DeviceScanner};
use crate::domain::error::{ComTermError, ComTermResult};

type PortSource = Box<dyn Fn() -> serialport::Result<Vec<SerialPortInfo>> + Send + Sync>;

/// Finds serial ports through `serialport::available_ports`.
pub struct SerialPortScanner {
    source: PortSource,
    poll_interval: Duration,
}

impl SerialPortScanner {
    pub fn new() -> Self {
        Self::with_source(serialport::available_ports)
    }

    /// Scan ports reported by `source` instead of the system.
    pub fn with_source<F>(source: F) -> Self
    where
        F: Fn() -> serialport::Result<Vec<SerialPortInfo>> + Send + Sync + 'static,
    {
        Self {
            source: Box::new(source),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for SerialPortScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceScanner for SerialPortScanner {
    fn scan_devices(&self) -> ComTermResult<DeviceMap> {
        let ports = (self.source)().map_err(|e| ComTermError::DeviceScan {
            message: e.to_string(),
        })?;
        if ports.is_empty() {
            return Err(ComTermError::DeviceScan {
                message: "Serial interface not found".to_string(),
            });
        }

        Ok(ports
            .into_iter()
            .map(|info| {
                let description = describe(&info.port_type);
                (info.port_name, description)
            })
            .collect())
    }

    /// An empty `port` waits for any device at all.
    fn wait_for_device(&self, port: &str, timeout: Duration) -> ComTermResult<DeviceMap> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.scan_devices() {
                Ok(devices) if port.is_empty() || devices.contains_key(port) => {
                    debug!("Found {} serial device(s)", devices.len());
                    return Ok(devices);
                }
                Ok(_) => trace!("{} not present yet", port),
                Err(e) => trace!("Scan failed, retrying: {}", e),
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Timed out waiting for {}", port);
                return Ok(DeviceMap::new());
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}

fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let name = match (&usb.manufacturer, &usb.product) {
                (Some(manufacturer), Some(product)) => format!("{} {}", manufacturer, product),
                (None, Some(product)) => product.clone(),
                (Some(manufacturer), None) => manufacturer.clone(),
                (None, None) => "USB serial".to_string(),
            };
            format!("{} ({:04x}:{:04x})", name, usb.vid, usb.pid)
        }
        SerialPortType::PciPort => "PCI serial".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
        SerialPortType::Unknown => "Serial port".to_string(),
    }
}
