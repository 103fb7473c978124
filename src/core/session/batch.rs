use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::device::{SerialDevice, WriteSink};
use crate::core::failure::{ClassifiedError, ExceptionQueue, ExceptionSender};
use crate::core::pump::ReceivePump;
use crate::core::session::redirector::RedirectorState;
use crate::core::signal::TerminationSignal;
use crate::core::BUF_SIZE;

/// Plain byte pipe between stdin/stdout and the device, for scripts.
///
/// No key translation, no resize frames, no exit prompt. The session ends
/// when stdin reaches EOF or the device fails, and is never reattachable.
pub struct BatchRedirector {
    id: Uuid,
    state: RedirectorState,
    device: Arc<dyn SerialDevice>,
    signal: Arc<TerminationSignal>,
    queue: ExceptionQueue,
    input: Option<Box<dyn Read + Send>>,
    output: Option<Box<dyn Write + Send>>,
    sink: Option<Box<dyn WriteSink>>,
    stdin_handle: Option<JoinHandle<()>>,
    receive_handle: Option<JoinHandle<()>>,
}

impl BatchRedirector {
    pub fn new(
        device: Arc<dyn SerialDevice>,
        input: Box<dyn Read + Send>,
        output: Box<dyn Write + Send>,
    ) -> Result<Self, ClassifiedError> {
        let sink = device
            .open_writer()
            .map_err(|e| ClassifiedError::device(&e, "Open serial writer"))?;

        Ok(Self {
            id: Uuid::new_v4(),
            state: RedirectorState::Created,
            device,
            signal: Arc::new(TerminationSignal::new()),
            queue: ExceptionQueue::new(),
            input: Some(input),
            output: Some(output),
            sink: Some(sink),
            stdin_handle: None,
            receive_handle: None,
        })
    }

    pub fn state(&self) -> RedirectorState {
        self.state
    }

    pub fn start(&mut self) -> Result<(), ClassifiedError> {
        if self.state != RedirectorState::Created {
            return Ok(());
        }
        self.state = RedirectorState::Running;
        info!(session = %self.id, "Batch session started");

        if let Some(output) = self.output.take() {
            let pump = ReceivePump::new(
                Arc::clone(&self.device),
                output,
                Arc::clone(&self.signal),
                self.queue.sender(),
            );
            let signal = Arc::clone(&self.signal);
            let handle = thread::Builder::new()
                .name("receive-pump".into())
                .spawn(move || {
                    pump.run();
                    signal.set();
                })
                .map_err(|e| self.spawn_failed(&e))?;
            self.receive_handle = Some(handle);
        }

        if let (Some(input), Some(sink)) = (self.input.take(), self.sink.take()) {
            let signal = Arc::clone(&self.signal);
            let errors = self.queue.sender();
            let handle = thread::Builder::new()
                .name("stdin-pump".into())
                .spawn(move || {
                    pipe_to_device(input, sink, &signal, &errors);
                    signal.set();
                })
                .map_err(|e| self.spawn_failed(&e))?;
            self.stdin_handle = Some(handle);
        }
        Ok(())
    }

    pub fn await_termination(&mut self) {
        if matches!(self.state, RedirectorState::Created | RedirectorState::Done) {
            return;
        }
        self.state = RedirectorState::Awaiting;

        self.signal.wait();
        self.device.cancel_pending();

        if let Some(handle) = self.receive_handle.take() {
            if handle.join().is_err() {
                warn!(session = %self.id, "The receive pump panicked");
            }
        }
        // A read on stdin cannot be cancelled; leave that thread behind.
        if let Some(handle) = self.stdin_handle.take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!(session = %self.id, "The stdin pump panicked");
                }
            } else {
                debug!(session = %self.id, "Leaving stdin pump blocked on read");
            }
        }

        self.state = RedirectorState::Done;
        info!(session = %self.id, "Batch session finished");
    }

    /// Batch sessions are never resumed.
    pub fn reattachable(&self) -> Option<bool> {
        (self.state == RedirectorState::Done).then_some(false)
    }

    pub fn take_errors(&self) -> Vec<ClassifiedError> {
        self.queue.drain()
    }

    fn spawn_failed(&self, err: &std::io::Error) -> ClassifiedError {
        self.signal.set();
        ClassifiedError::generic(err, "Start pump thread")
    }
}

fn pipe_to_device(
    mut input: Box<dyn Read + Send>,
    mut sink: Box<dyn WriteSink>,
    signal: &TerminationSignal,
    errors: &ExceptionSender,
) {
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => {
                debug!("Reached end of stdin");
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                push(errors, signal, ClassifiedError::generic(&e, "Read from stdin"));
                return;
            }
        };
        if signal.is_set() {
            return;
        }

        let written = sink
            .begin_write(&buf[..n])
            .and_then(|_| sink.wait_complete());
        if let Err(e) = written {
            push(errors, signal, ClassifiedError::device(&e, "Write to serial device"));
            return;
        }
    }
}

fn push(errors: &ExceptionSender, signal: &TerminationSignal, mut error: ClassifiedError) {
    if !signal.set() {
        error = error.into_cancellation();
    }
    errors.push(error);
}
