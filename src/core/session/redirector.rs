use std::io::Write;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::console::{ConsoleIo, LogSink};
use crate::core::device::SerialDevice;
use crate::core::failure::{ClassifiedError, ErrorOrigin, ExceptionQueue, UNKNOWN_CODE};
use crate::core::pump::{AsyncWriter, ReceivePump, SendExit, SendPump};
use crate::core::signal::TerminationSignal;
use crate::core::BUF_SIZE;

/// Clears the screen before the session starts.
const CLEAR_SCREEN: &[u8] = b"\x1b[2J";

/// Lifecycle of a [`TerminalRedirector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectorState {
    /// Pumps built, no thread running yet
    Created,
    /// Both pumps running
    Running,
    /// Waiting for the pumps to finish
    Awaiting,
    /// Both pumps joined
    Done,
}

/// Per-session switches for the redirector.
#[derive(Debug, Clone)]
pub struct RedirectorOptions {
    /// Send resize frames when the console size changes
    pub resize_tracking: bool,
    /// Mirror keys typed by the user into the log as well
    pub stdin_logging: bool,
    /// Capacity of the write buffer feeding the device
    pub write_buffer: usize,
}

impl Default for RedirectorOptions {
    fn default() -> Self {
        Self {
            resize_tracking: false,
            stdin_logging: false,
            write_buffer: BUF_SIZE,
        }
    }
}

/// Sets the signal when a pump thread ends, even by panic.
struct SignalOnExit(Arc<TerminationSignal>);

impl Drop for SignalOnExit {
    fn drop(&mut self) {
        self.0.set();
    }
}

/// Runs one interactive session: a send pump and a receive pump sharing a
/// termination signal and an exception queue.
///
/// Every instance is used once. Reconnecting builds a new one.
pub struct TerminalRedirector {
    id: Uuid,
    state: RedirectorState,
    device: Arc<dyn SerialDevice>,
    signal: Arc<TerminationSignal>,
    queue: ExceptionQueue,
    send: Option<SendPump>,
    output: Option<Box<dyn Write + Send>>,
    log: Option<Arc<dyn LogSink>>,
    send_handle: Option<JoinHandle<SendExit>>,
    receive_handle: Option<JoinHandle<()>>,
    send_exit: Option<SendExit>,
}

impl TerminalRedirector {
    pub fn new(
        device: Arc<dyn SerialDevice>,
        console: ConsoleIo,
        log: Option<Arc<dyn LogSink>>,
        options: RedirectorOptions,
    ) -> Result<Self, ClassifiedError> {
        let signal = Arc::new(TerminationSignal::new());
        let queue = ExceptionQueue::new();

        let sink = device
            .open_writer()
            .map_err(|e| ClassifiedError::device(&e, "Open serial writer"))?;
        let writer = AsyncWriter::new(sink, options.write_buffer);

        let mut send = SendPump::new(
            console.input,
            console.prompt,
            writer,
            Arc::clone(&signal),
            queue.sender(),
        )
        .with_resize_tracking(options.resize_tracking);
        if let (Some(log), true) = (&log, options.stdin_logging) {
            send = send.with_log(Arc::clone(log));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            state: RedirectorState::Created,
            device,
            signal,
            queue,
            send: Some(send),
            output: Some(console.output),
            log,
            send_handle: None,
            receive_handle: None,
            send_exit: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RedirectorState {
        self.state
    }

    /// Launch both pumps.
    ///
    /// A thread that cannot be spawned stops the session: the signal is set
    /// and [`await_termination`](Self::await_termination) still has to be called.
    pub fn start(&mut self) -> Result<(), ClassifiedError> {
        if self.state != RedirectorState::Created {
            return Ok(());
        }
        self.state = RedirectorState::Running;
        info!(session = %self.id, "Session started");

        if let Some(mut output) = self.output.take() {
            if let Err(e) = output.write_all(CLEAR_SCREEN).and_then(|_| output.flush()) {
                debug!(session = %self.id, "Could not clear the console: {}", e);
            }

            let mut receive = ReceivePump::new(
                Arc::clone(&self.device),
                output,
                Arc::clone(&self.signal),
                self.queue.sender(),
            );
            if let Some(log) = self.log.take() {
                receive = receive.with_log(log);
            }

            let guard = SignalOnExit(Arc::clone(&self.signal));
            let handle = thread::Builder::new()
                .name("receive-pump".into())
                .spawn(move || {
                    let _guard = guard;
                    receive.run();
                })
                .map_err(|e| self.spawn_failed(&e))?;
            self.receive_handle = Some(handle);
        }

        if let Some(send) = self.send.take() {
            let guard = SignalOnExit(Arc::clone(&self.signal));
            let handle = thread::Builder::new()
                .name("send-pump".into())
                .spawn(move || {
                    let _guard = guard;
                    send.run()
                })
                .map_err(|e| self.spawn_failed(&e))?;
            self.send_handle = Some(handle);
        }
        Ok(())
    }

    /// Block until both pumps have exited.
    pub fn await_termination(&mut self) {
        if matches!(self.state, RedirectorState::Created | RedirectorState::Done) {
            return;
        }
        self.state = RedirectorState::Awaiting;

        self.signal.wait();
        // The receive pump may be parked in the device wait.
        self.device.cancel_pending();

        if let Some(handle) = self.send_handle.take() {
            match handle.join() {
                Ok(exit) => self.send_exit = Some(exit),
                Err(_) => self.pump_panicked("send"),
            }
        }
        if let Some(handle) = self.receive_handle.take() {
            if handle.join().is_err() {
                self.pump_panicked("receive");
            }
        }

        self.state = RedirectorState::Done;
        info!(session = %self.id, reattachable = self.send_exit != Some(SendExit::UserClosed), "Session finished");
    }

    /// Whether the session ended without the user asking to leave.
    /// `None` until [`await_termination`](Self::await_termination) returned.
    pub fn reattachable(&self) -> Option<bool> {
        (self.state == RedirectorState::Done).then(|| self.send_exit != Some(SendExit::UserClosed))
    }

    /// Failures the pumps reported, in arrival order.
    pub fn take_errors(&self) -> Vec<ClassifiedError> {
        self.queue.drain()
    }

    fn spawn_failed(&self, err: &std::io::Error) -> ClassifiedError {
        self.signal.set();
        ClassifiedError::generic(err, "Start pump thread")
    }

    fn pump_panicked(&self, which: &str) {
        warn!(session = %self.id, "The {} pump panicked", which);
        self.queue.sender().push(ClassifiedError::new(
            UNKNOWN_CODE,
            format!("The {} pump panicked", which),
            ErrorOrigin::Generic,
        ));
    }
}

impl Drop for TerminalRedirector {
    fn drop(&mut self) {
        if self.state == RedirectorState::Running {
            self.signal.set();
            self.await_termination();
        }
    }
}
