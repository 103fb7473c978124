use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::console::{ConsoleEvent, ConsoleInput, ExitPrompt, InputReady, KeyStroke, LogSink, WindowSize};
use crate::core::failure::{ClassifiedError, ExceptionSender};
use crate::core::pump::writer::AsyncWriter;
use crate::core::resize;
use crate::core::signal::TerminationSignal;

/// What terminals in application keypad mode send for F1.
const EXIT_SEQUENCE: [u8; 3] = [0x1b, b'O', b'P'];

/// How the send pump left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendExit {
    /// The user pressed the exit key and confirmed
    UserClosed,
    /// The termination signal fired or the pump failed
    Stopped,
}

/// Console to device pump.
pub struct SendPump {
    input: Box<dyn ConsoleInput>,
    prompt: Box<dyn ExitPrompt>,
    writer: AsyncWriter,
    log: Option<Arc<dyn LogSink>>,
    resize_tracking: bool,
    current_size: Option<WindowSize>,
    pending_resize: Option<WindowSize>,
    signal: Arc<TerminationSignal>,
    errors: ExceptionSender,
}

impl SendPump {
    pub fn new(
        input: Box<dyn ConsoleInput>,
        prompt: Box<dyn ExitPrompt>,
        writer: AsyncWriter,
        signal: Arc<TerminationSignal>,
        errors: ExceptionSender,
    ) -> Self {
        Self {
            input,
            prompt,
            writer,
            log: None,
            resize_tracking: false,
            current_size: None,
            pending_resize: None,
            signal,
            errors,
        }
    }

    /// Mirror every forwarded key to `log`.
    pub fn with_log(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_resize_tracking(mut self, enabled: bool) -> Self {
        self.resize_tracking = enabled;
        self
    }

    /// Run until the user leaves, the signal fires or something fails.
    ///
    /// The writer is always shut down before this returns.
    pub fn run(mut self) -> SendExit {
        let mut reported = false;
        let exit = match self.pump() {
            Ok(exit) => exit,
            Err(error) => {
                self.report(error);
                reported = true;
                SendExit::Stopped
            }
        };

        if let Err(error) = self.writer.shutdown() {
            if reported {
                debug!("Serial writer shutdown failed after pump failure: {}", error);
            } else {
                self.report(error);
            }
        }
        exit
    }

    fn pump(&mut self) -> Result<SendExit, ClassifiedError> {
        if self.resize_tracking {
            match self.input.window_size() {
                Ok(size) => self.current_size = Some(size),
                Err(e) => debug!("Could not query console size: {}", e),
            }
        }

        loop {
            let ready = self
                .input
                .wait(&self.signal)
                .map_err(|e| ClassifiedError::generic(&e, "Wait for console input"))?;
            if ready == InputReady::Terminated {
                return Ok(SendExit::Stopped);
            }

            let events = self
                .input
                .read_events()
                .map_err(|e| ClassifiedError::generic(&e, "Read console input"))?;
            if self.process_batch(&events)? {
                return Ok(SendExit::UserClosed);
            }

            self.emit_pending_resize()?;
            self.writer.flush()?;
        }
    }

    /// Returns true once the user confirmed leaving the session.
    fn process_batch(&mut self, events: &[ConsoleEvent]) -> Result<bool, ClassifiedError> {
        let mut idx = 0;
        while idx < events.len() {
            if is_exit_sequence(&events[idx..]) {
                idx += EXIT_SEQUENCE.len();
                if self.should_terminate()? {
                    return Ok(true);
                }
                continue;
            }

            match &events[idx] {
                ConsoleEvent::Key(key) if key.key_down && key.exit_key => {
                    if self.should_terminate()? {
                        return Ok(true);
                    }
                }
                ConsoleEvent::Key(key) if key.key_down => self.forward_key(key)?,
                ConsoleEvent::Resize(size) if self.resize_tracking => {
                    self.pending_resize = (self.current_size != Some(*size)).then_some(*size);
                }
                _ => {}
            }
            idx += 1;
        }
        Ok(false)
    }

    fn forward_key(&mut self, key: &KeyStroke) -> Result<(), ClassifiedError> {
        for _ in 0..key.repeat_count {
            for byte in &key.bytes {
                self.writer.put(*byte)?;
            }
            if let Some(log) = &self.log {
                log.write_bytes(&key.bytes)
                    .map_err(|e| ClassifiedError::generic(&e, "Write stdin to log"))?;
            }
        }
        Ok(())
    }

    // Sent only once the console queue is empty so a drag-resize yields one frame.
    fn emit_pending_resize(&mut self) -> Result<(), ClassifiedError> {
        let Some(size) = self.pending_resize else {
            return Ok(());
        };

        let pending = self
            .input
            .pending_events()
            .map_err(|e| ClassifiedError::generic(&e, "Count console input events"))?;
        if pending == 0 {
            debug!("Console resized to {}x{}", size.rows, size.cols);
            self.writer.put_bulk(&resize::encode(size))?;
            self.current_size = Some(size);
            self.pending_resize = None;
        }
        Ok(())
    }

    fn should_terminate(&mut self) -> Result<bool, ClassifiedError> {
        self.writer.flush()?;
        let confirmed = self
            .prompt
            .confirm_exit(&self.signal)
            .map_err(|e| ClassifiedError::generic(&e, "Ask for exit confirmation"))?;
        if confirmed {
            info!("Session closed by user");
            self.signal.set();
        }
        Ok(confirmed)
    }

    fn report(&self, mut error: ClassifiedError) {
        // The session was already stopping; the failure is fallout from that.
        if !self.signal.set() {
            error = error.into_cancellation();
        }
        if error.is_cancellation {
            debug!("Send pump stopped: {}", error);
        } else {
            warn!("Send pump failed: {}", error);
        }
        self.errors.push(error);
    }
}

fn is_exit_sequence(events: &[ConsoleEvent]) -> bool {
    events.len() >= EXIT_SEQUENCE.len()
        && events
            .iter()
            .zip(EXIT_SEQUENCE)
            .all(|(event, expected)| match event {
                ConsoleEvent::Key(key) => key.key_down && key.single_byte() == Some(expected),
                _ => false,
            })
}
