//! Seams between the redirector and the local console.

use std::io;

use crate::core::signal::TerminationSignal;

/// Console size in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
}

impl WindowSize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

/// One translated key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStroke {
    pub key_down: bool,
    pub repeat_count: u16,
    /// The "leave this session" key
    pub exit_key: bool,
    /// Bytes this key produces on the wire, empty for keys with no encoding
    pub bytes: Vec<u8>,
}

impl KeyStroke {
    pub fn char(byte: u8) -> Self {
        Self::bytes(vec![byte])
    }

    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self {
            key_down: true,
            repeat_count: 1,
            exit_key: false,
            bytes,
        }
    }

    pub fn exit() -> Self {
        Self {
            key_down: true,
            repeat_count: 1,
            exit_key: true,
            bytes: Vec::new(),
        }
    }

    pub fn with_repeat(mut self, repeat_count: u16) -> Self {
        self.repeat_count = repeat_count;
        self
    }

    /// The single byte this stroke carries, if it is a plain one-shot key.
    pub(crate) fn single_byte(&self) -> Option<u8> {
        match self.bytes.as_slice() {
            [byte] if self.repeat_count == 1 => Some(*byte),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    Key(KeyStroke),
    Resize(WindowSize),
    /// Mouse, focus and other events the redirector ignores
    Other,
}

/// Result of waiting on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputReady {
    Events,
    Terminated,
}

/// Console input owned by the send pump.
pub trait ConsoleInput: Send {
    /// Block until input is available or `signal` fires.
    fn wait(&mut self, signal: &TerminationSignal) -> io::Result<InputReady>;

    /// Read the events currently queued, at least one after `wait` returned `Events`.
    fn read_events(&mut self) -> io::Result<Vec<ConsoleEvent>>;

    /// Events queued but not yet read.
    fn pending_events(&mut self) -> io::Result<usize>;

    fn window_size(&self) -> io::Result<WindowSize>;
}

/// Asks the user whether to leave the session.
pub trait ExitPrompt: Send {
    /// Returns false without an answer once `signal` fires, so a session
    /// ended by the device does not wait on the user.
    fn confirm_exit(&mut self, signal: &TerminationSignal) -> io::Result<bool>;
}

/// Append-only transcript of the session.
///
/// Shared by the receive pump and, with stdin logging, the send pump.
pub trait LogSink: Send + Sync {
    fn write_bytes(&self, data: &[u8]) -> io::Result<()>;

    fn write_byte(&self, byte: u8) -> io::Result<()> {
        self.write_bytes(&[byte])
    }
}

/// Console handles for one session.
pub struct ConsoleIo {
    pub input: Box<dyn ConsoleInput>,
    pub prompt: Box<dyn ExitPrompt>,
    pub output: Box<dyn io::Write + Send>,
}

/// Opens the console for a session on `port`.
pub trait ConsoleProvider {
    fn open(&self, port: &str) -> io::Result<ConsoleIo>;
}
