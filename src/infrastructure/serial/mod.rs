// Serial module - serialport bindings for the session core
pub mod device;
pub mod scanner;

pub use device::{SerialPortDevice, SerialPortOpener, SerialPortSink};
pub use scanner::SerialPortScanner;
