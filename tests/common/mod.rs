//! In-memory collaborators for driving the orchestrator end to end.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use comterm::core::console::{
    ConsoleEvent, ConsoleInput, ConsoleIo, ConsoleProvider, ExitPrompt, InputReady, KeyStroke,
    WindowSize,
};
use comterm::core::device::{DeviceMap, DeviceOpener, DeviceScanner, SerialDevice, WriteSink};
use comterm::core::failure::{operation_aborted, ClassifiedError, ErrorOrigin};
use comterm::core::session::ErrorReporter;
use comterm::core::signal::TerminationSignal;
use comterm::domain::config::SerialParams;
use comterm::ComTermResult;

/// Bytes written to the device, shared with the test.
#[derive(Clone, Default)]
pub struct Written(Arc<Mutex<Vec<u8>>>);

impl Written {
    pub fn bytes(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

struct RecordingSink(Written);

impl WriteSink for RecordingSink {
    fn begin_write(&mut self, data: &[u8]) -> io::Result<()> {
        (self.0).0.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    fn wait_complete(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub enum Step {
    Data(&'static [u8]),
    Fail(i32),
}

#[derive(Default)]
struct LineState {
    steps: VecDeque<Step>,
    ready: VecDeque<u8>,
    cancelled: bool,
}

/// Device that plays back `steps`, then idles until cancelled.
pub struct ScriptDevice {
    state: Mutex<LineState>,
    cond: Condvar,
    written: Written,
}

impl ScriptDevice {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LineState {
                steps: steps.into(),
                ..LineState::default()
            }),
            cond: Condvar::new(),
            written: Written::default(),
        })
    }

    pub fn idle() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn written(&self) -> Written {
        self.written.clone()
    }
}

impl SerialDevice for ScriptDevice {
    fn wait_for_data(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.cancelled {
                return Err(operation_aborted());
            }
            if !state.ready.is_empty() {
                return Ok(());
            }
            match state.steps.pop_front() {
                Some(Step::Data(bytes)) => state.ready.extend(bytes.iter().copied()),
                Some(Step::Fail(code)) => return Err(io::Error::from_raw_os_error(code)),
                None => state = self.cond.wait(state).unwrap(),
            }
        }
    }

    fn bytes_to_read(&self) -> io::Result<usize> {
        Ok(self.state.lock().unwrap().ready.len())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        let n = buf.len().min(state.ready.len());
        for (slot, byte) in buf.iter_mut().zip(state.ready.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn cancel_pending(&self) {
        self.state.lock().unwrap().cancelled = true;
        self.cond.notify_all();
    }

    fn open_writer(&self) -> io::Result<Box<dyn WriteSink>> {
        Ok(Box::new(RecordingSink(self.written.clone())))
    }
}

/// Console that delivers one batch per wait, then blocks until the session stops.
pub struct ScriptConsole {
    batches: VecDeque<Vec<ConsoleEvent>>,
}

impl ScriptConsole {
    pub fn new(batches: Vec<Vec<ConsoleEvent>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }

    pub fn typing_then_exit(text: &[u8]) -> Self {
        let mut keys: Vec<ConsoleEvent> = text
            .iter()
            .map(|&byte| ConsoleEvent::Key(KeyStroke::char(byte)))
            .collect();
        keys.push(ConsoleEvent::Key(KeyStroke::exit()));
        Self::new(vec![keys])
    }
}

impl ConsoleInput for ScriptConsole {
    fn wait(&mut self, signal: &TerminationSignal) -> io::Result<InputReady> {
        if signal.is_set() {
            return Ok(InputReady::Terminated);
        }
        if !self.batches.is_empty() {
            return Ok(InputReady::Events);
        }
        signal.wait();
        Ok(InputReady::Terminated)
    }

    fn read_events(&mut self) -> io::Result<Vec<ConsoleEvent>> {
        Ok(self.batches.pop_front().unwrap_or_default())
    }

    fn pending_events(&mut self) -> io::Result<usize> {
        Ok(self.batches.iter().map(Vec::len).sum())
    }

    fn window_size(&self) -> io::Result<WindowSize> {
        Ok(WindowSize::new(24, 80))
    }
}

/// Says yes to every exit prompt.
pub struct YesPrompt;

impl ExitPrompt for YesPrompt {
    fn confirm_exit(&mut self, _signal: &TerminationSignal) -> io::Result<bool> {
        Ok(true)
    }
}

/// Console output shared with the test.
#[derive(Clone, Default)]
pub struct Screen(Arc<Mutex<Vec<u8>>>);

impl Screen {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for Screen {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands out one console per session.
pub struct ScriptConsoles {
    consoles: Mutex<VecDeque<ScriptConsole>>,
    pub screen: Screen,
}

impl ScriptConsoles {
    pub fn new(consoles: Vec<ScriptConsole>) -> Self {
        Self {
            consoles: Mutex::new(consoles.into()),
            screen: Screen::default(),
        }
    }
}

impl ConsoleProvider for ScriptConsoles {
    fn open(&self, _port: &str) -> io::Result<ConsoleIo> {
        let input = self
            .consoles
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no console left"))?;
        Ok(ConsoleIo {
            input: Box::new(input),
            prompt: Box::new(YesPrompt),
            output: Box::new(self.screen.clone()),
        })
    }
}

/// Hands out one scripted outcome per open, recording the ports asked for.
pub struct ScriptOpener {
    outcomes: Mutex<VecDeque<Result<Arc<dyn SerialDevice>, ClassifiedError>>>,
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl ScriptOpener {
    pub fn new(outcomes: Vec<Result<Arc<dyn SerialDevice>, ClassifiedError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            opened: Arc::default(),
        }
    }
}

impl DeviceOpener for ScriptOpener {
    fn open(&self, port: &str, _params: &SerialParams) -> Result<Arc<dyn SerialDevice>, ClassifiedError> {
        self.opened.lock().unwrap().push(port.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ClassifiedError::new(2, "no device left", ErrorOrigin::DeviceIo)))
    }
}

/// Answers every wait with the same device map.
pub struct FixedScanner {
    devices: DeviceMap,
    pub waits: Arc<Mutex<Vec<(String, Duration)>>>,
}

impl FixedScanner {
    pub fn with_ports(ports: &[&str]) -> Self {
        Self {
            devices: ports
                .iter()
                .map(|port| (port.to_string(), "Serial port".to_string()))
                .collect(),
            waits: Arc::default(),
        }
    }
}

impl DeviceScanner for FixedScanner {
    fn scan_devices(&self) -> ComTermResult<DeviceMap> {
        Ok(self.devices.clone())
    }

    fn wait_for_device(&self, port: &str, timeout: Duration) -> ComTermResult<DeviceMap> {
        self.waits.lock().unwrap().push((port.to_string(), timeout));
        Ok(self.devices.clone())
    }
}

/// Collects every reported failure.
#[derive(Clone, Default)]
pub struct RecordingReporter(pub Arc<Mutex<Vec<ClassifiedError>>>);

impl RecordingReporter {
    pub fn reported(&self) -> Vec<ClassifiedError> {
        self.0.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, errors: &[ClassifiedError]) {
        self.0.lock().unwrap().extend_from_slice(errors);
    }
}
