//! ComTerm Library
//!
//! Interactive terminal redirector for serial devices: keys go to the
//! device, device output goes to the terminal, with transcript logging,
//! resize forwarding and automatic reconnection.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use domain::error::{ComTermError, ComTermResult};
pub use domain::config::{ComTermConfig, SessionConfig};
pub use core::failure::ClassifiedError;
pub use core::session::{SessionOrchestrator, SessionResult, TerminalRedirector};
