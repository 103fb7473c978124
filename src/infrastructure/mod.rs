// Infrastructure module - External dependencies and adapters
pub mod config;
pub mod console;
pub mod log_writer;
pub mod logging;
pub mod serial;
