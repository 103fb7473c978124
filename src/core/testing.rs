//! In-memory stand-ins for the console and the serial device.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Condvar, Mutex};

use crate::core::console::{
    ConsoleEvent, ConsoleInput, ExitPrompt, InputReady, KeyStroke, LogSink, WindowSize,
};
use crate::core::device::{SerialDevice, WriteSink};
use crate::core::failure::operation_aborted;
use crate::core::signal::TerminationSignal;

#[derive(Default)]
struct SinkState {
    written: Vec<u8>,
    writes: Vec<Vec<u8>>,
    in_flight: usize,
    max_in_flight: usize,
    fail_code: Option<i32>,
}

/// Write sink recording every write and how many were outstanding.
#[derive(Clone, Default)]
pub struct MockSink {
    state: Arc<Mutex<SinkState>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose writes fail with the OS error `code`.
    pub fn failing(code: i32) -> Self {
        let sink = Self::new();
        sink.state.lock().unwrap().fail_code = Some(code);
        sink
    }

    pub fn written(&self) -> Vec<u8> {
        self.state.lock().unwrap().written.clone()
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}

impl WriteSink for MockSink {
    fn begin_write(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(code) = state.fail_code {
            return Err(io::Error::from_raw_os_error(code));
        }
        state.in_flight += 1;
        state.max_in_flight = state.max_in_flight.max(state.in_flight);
        state.written.extend_from_slice(data);
        state.writes.push(data.to_vec());
        Ok(())
    }

    fn wait_complete(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.in_flight = state.in_flight.saturating_sub(1);
        Ok(())
    }
}

enum ConsoleStep {
    Batch(Vec<ConsoleEvent>),
    Fail(i32),
}

/// Console replaying fixed event batches, then idling until terminated.
pub struct ScriptedConsole {
    steps: VecDeque<ConsoleStep>,
    size: WindowSize,
}

impl ScriptedConsole {
    pub fn new(size: WindowSize) -> Self {
        Self {
            steps: VecDeque::new(),
            size,
        }
    }

    pub fn batch(mut self, events: Vec<ConsoleEvent>) -> Self {
        self.steps.push_back(ConsoleStep::Batch(events));
        self
    }

    pub fn keys(self, text: &[u8]) -> Self {
        let events = text
            .iter()
            .map(|b| ConsoleEvent::Key(KeyStroke::char(*b)))
            .collect();
        self.batch(events)
    }

    pub fn failure(mut self, code: i32) -> Self {
        self.steps.push_back(ConsoleStep::Fail(code));
        self
    }
}

impl ConsoleInput for ScriptedConsole {
    fn wait(&mut self, signal: &TerminationSignal) -> io::Result<InputReady> {
        if signal.is_set() {
            return Ok(InputReady::Terminated);
        }
        if !self.steps.is_empty() {
            return Ok(InputReady::Events);
        }
        signal.wait();
        Ok(InputReady::Terminated)
    }

    fn read_events(&mut self) -> io::Result<Vec<ConsoleEvent>> {
        match self.steps.pop_front() {
            Some(ConsoleStep::Batch(events)) => Ok(events),
            Some(ConsoleStep::Fail(code)) => Err(io::Error::from_raw_os_error(code)),
            None => Ok(Vec::new()),
        }
    }

    fn pending_events(&mut self) -> io::Result<usize> {
        Ok(self
            .steps
            .iter()
            .map(|step| match step {
                ConsoleStep::Batch(events) => events.len(),
                ConsoleStep::Fail(_) => 1,
            })
            .sum())
    }

    fn window_size(&self) -> io::Result<WindowSize> {
        Ok(self.size)
    }
}

/// Exit prompt answering from a queue, "no" once it runs out.
#[derive(Clone, Default)]
pub struct ScriptedPrompt {
    answers: Arc<Mutex<VecDeque<bool>>>,
    asked: Arc<Mutex<usize>>,
    until_stopped: bool,
}

impl ScriptedPrompt {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Arc::new(Mutex::new(answers.iter().copied().collect())),
            asked: Arc::default(),
            until_stopped: false,
        }
    }

    /// Never answers; stays open until the session is stopped.
    pub fn until_stopped() -> Self {
        Self {
            until_stopped: true,
            ..Self::default()
        }
    }

    pub fn asked(&self) -> usize {
        *self.asked.lock().unwrap()
    }
}

impl ExitPrompt for ScriptedPrompt {
    fn confirm_exit(&mut self, signal: &TerminationSignal) -> io::Result<bool> {
        *self.asked.lock().unwrap() += 1;
        if self.until_stopped {
            signal.wait();
            return Ok(false);
        }
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(false))
    }
}

pub enum DeviceStep {
    Data(Vec<u8>),
    Fail(i32),
}

#[derive(Default)]
struct DeviceState {
    steps: VecDeque<DeviceStep>,
    ready: VecDeque<u8>,
    cancelled: bool,
    waits: usize,
}

/// Serial device fed from a script; an exhausted script parks the reader
/// until `cancel_pending`.
pub struct FakeDevice {
    state: Mutex<DeviceState>,
    cond: Condvar,
    sink: MockSink,
}

impl FakeDevice {
    pub fn new(steps: Vec<DeviceStep>) -> Self {
        Self::with_sink(steps, MockSink::new())
    }

    pub fn with_sink(steps: Vec<DeviceStep>, sink: MockSink) -> Self {
        Self {
            state: Mutex::new(DeviceState {
                steps: steps.into(),
                ..DeviceState::default()
            }),
            cond: Condvar::new(),
            sink,
        }
    }

    pub fn idle() -> Self {
        Self::new(Vec::new())
    }

    pub fn sink(&self) -> MockSink {
        self.sink.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().unwrap().cancelled
    }

    pub fn waits(&self) -> usize {
        self.state.lock().unwrap().waits
    }
}

impl SerialDevice for FakeDevice {
    fn wait_for_data(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.waits += 1;
        loop {
            if state.cancelled {
                return Err(operation_aborted());
            }
            if !state.ready.is_empty() {
                return Ok(());
            }
            match state.steps.pop_front() {
                Some(DeviceStep::Data(data)) => state.ready.extend(data),
                Some(DeviceStep::Fail(code)) => return Err(io::Error::from_raw_os_error(code)),
                None => state = self.cond.wait(state).unwrap(),
            }
        }
    }

    fn bytes_to_read(&self) -> io::Result<usize> {
        Ok(self.state.lock().unwrap().ready.len())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        let count = buf.len().min(state.ready.len());
        for (slot, byte) in buf.iter_mut().zip(state.ready.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn cancel_pending(&self) {
        self.state.lock().unwrap().cancelled = true;
        self.cond.notify_all();
    }

    fn open_writer(&self) -> io::Result<Box<dyn WriteSink>> {
        Ok(Box::new(self.sink.clone()))
    }
}

/// Console output captured in memory.
#[derive(Clone, Default)]
pub struct SharedOutput {
    data: Arc<Mutex<Vec<u8>>>,
}

impl SharedOutput {
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Transcript kept in memory.
#[derive(Default)]
pub struct MemoryLog {
    data: Mutex<Vec<u8>>,
}

impl MemoryLog {
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

impl LogSink for MemoryLog {
    fn write_bytes(&self, data: &[u8]) -> io::Result<()> {
        self.data.lock().unwrap().extend_from_slice(data);
        Ok(())
    }
}
