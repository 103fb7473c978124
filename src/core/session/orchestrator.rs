use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::core::console::{ConsoleProvider, LogSink};
use crate::core::device::{DeviceOpener, DeviceScanner, SerialDevice};
use crate::core::failure::ClassifiedError;
use crate::core::session::batch::BatchRedirector;
use crate::core::session::redirector::{RedirectorOptions, TerminalRedirector};
use crate::domain::config::SessionConfig;
use crate::domain::error::{ComTermError, ComTermResult};

/// Decides which pump failures the user gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TriagePolicy {
    pub reconnect: bool,
    pub allow_detach: bool,
}

impl TriagePolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            reconnect: config.reconnect.enabled,
            allow_detach: config.allow_detach,
        }
    }

    fn suppresses_detach(&self) -> bool {
        self.reconnect && self.allow_detach
    }
}

/// Filter a session's failures down to the ones worth reporting, keeping
/// their order.
pub fn triage(errors: Vec<ClassifiedError>, policy: TriagePolicy) -> Vec<ClassifiedError> {
    errors
        .into_iter()
        .filter(|error| {
            if error.is_cancellation {
                debug!("Ignoring cancellation: {}", error);
                return false;
            }
            if error.is_detach() && policy.suppresses_detach() {
                info!("Device detached: {}", error);
                return false;
            }
            true
        })
        .collect()
}

/// Outcome of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    /// False when the user asked to leave
    pub reattachable: bool,
    /// Failures that survived triage, in the order they happened
    pub errors: Vec<ClassifiedError>,
}

/// Shows surfaced failures to the user.
pub trait ErrorReporter {
    fn report(&self, errors: &[ClassifiedError]);
}

/// Everything outside the core the orchestrator talks to.
pub struct Collaborators {
    pub opener: Box<dyn DeviceOpener>,
    pub consoles: Box<dyn ConsoleProvider>,
    pub scanner: Box<dyn DeviceScanner>,
    pub reporter: Box<dyn ErrorReporter>,
}

/// Drives sessions on one device, reconnecting when configured to.
pub struct SessionOrchestrator {
    config: SessionConfig,
    collaborators: Collaborators,
    log: Option<Arc<dyn LogSink>>,
    sessions: u32,
}

impl SessionOrchestrator {
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            log: None,
            sessions: 0,
        }
    }

    /// Share `log` with every session this orchestrator runs.
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    /// Sessions started so far, reconnects included.
    pub fn sessions(&self) -> u32 {
        self.sessions
    }

    /// Run sessions until one ends for good.
    ///
    /// Returns the last session's result. Failing to reopen the device
    /// or to see it come back within the timeout is an error.
    pub fn run(&mut self) -> ComTermResult<SessionResult> {
        loop {
            let result = self.run_once()?;
            if !result.errors.is_empty() {
                self.collaborators.reporter.report(&result.errors);
            }

            if !(self.config.reconnect.enabled && result.reattachable) {
                return Ok(result);
            }
            self.wait_for_device()?;
        }
    }

    /// Open the device, run one redirector to completion and triage its failures.
    pub fn run_once(&mut self) -> ComTermResult<SessionResult> {
        let port = self.config.port.clone();
        let device = self.open_device(&port)?;
        let console = self
            .collaborators
            .consoles
            .open(&port)
            .map_err(|e| ComTermError::Console(ClassifiedError::generic(&e, "Open console")))?;

        let options = RedirectorOptions {
            resize_tracking: self.config.resize_tracking,
            stdin_logging: self.config.stdin_logging,
            ..RedirectorOptions::default()
        };
        let mut redirector = TerminalRedirector::new(device, console, self.log.clone(), options)
            .map_err(ComTermError::Session)?;
        self.sessions += 1;
        info!(session = %redirector.id(), "Connected to {}", port);

        let started = redirector.start();
        redirector.await_termination();

        let mut errors = redirector.take_errors();
        if let Err(error) = started {
            errors.insert(0, error);
        }

        Ok(SessionResult {
            reattachable: redirector.reattachable().unwrap_or(true),
            errors: triage(errors, TriagePolicy::from_config(&self.config)),
        })
    }

    /// Pipe `input` to the device and the device to `output` once, without
    /// key translation or reconnects.
    pub fn run_batch(
        &mut self,
        input: Box<dyn Read + Send>,
        output: Box<dyn Write + Send>,
    ) -> ComTermResult<SessionResult> {
        let port = self.config.port.clone();
        let device = self.open_device(&port)?;

        let mut redirector = BatchRedirector::new(device, input, output).map_err(ComTermError::Session)?;
        self.sessions += 1;

        let started = redirector.start();
        redirector.await_termination();

        let mut errors = redirector.take_errors();
        if let Err(error) = started {
            errors.insert(0, error);
        }
        let result = SessionResult {
            reattachable: false,
            errors: triage(errors, TriagePolicy::default()),
        };
        if !result.errors.is_empty() {
            self.collaborators.reporter.report(&result.errors);
        }
        Ok(result)
    }

    fn open_device(&self, port: &str) -> ComTermResult<Arc<dyn SerialDevice>> {
        self.collaborators
            .opener
            .open(port, &self.config.serial)
            .map_err(|source| ComTermError::DeviceOpen {
                port: port.to_string(),
                source,
            })
    }

    fn wait_for_device(&self) -> ComTermResult<()> {
        let port = &self.config.port;
        let policy = &self.config.reconnect;

        info!("Waiting for {} to come back", port);
        thread::sleep(policy.pause());

        let devices = self
            .collaborators
            .scanner
            .wait_for_device(port, policy.timeout())
            .map_err(|e| {
                warn!("Device scan failed while waiting for {}: {}", port, e);
                ComTermError::DeviceNotAvailable { port: port.clone() }
            })?;
        if !devices.contains_key(port) {
            return Err(ComTermError::DeviceNotAvailable { port: port.clone() });
        }
        Ok(())
    }
}
