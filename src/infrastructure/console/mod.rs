// Console module - crossterm bindings for the session core
pub mod keymap;

use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode, SetTitle};
use crossterm::execute;
use tracing::debug;

use crate::core::console::{
    ConsoleEvent, ConsoleInput, ConsoleIo, ConsoleProvider, ExitPrompt, InputReady, WindowSize,
};
use crate::core::signal::TerminationSignal;
use crate::core::BUF_SIZE;

/// crossterm cannot be woken from another thread, so the wait polls the
/// termination signal this often.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// Raw mode for as long as it lives.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            debug!("Could not restore terminal mode: {}", e);
        }
    }
}

/// The process terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstermConsole;

impl CrosstermConsole {
    pub fn new() -> Self {
        Self
    }
}

impl ConsoleProvider for CrosstermConsole {
    fn open(&self, port: &str) -> io::Result<ConsoleIo> {
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, SetTitle(format!("comterm: {}", port))) {
            debug!("Could not set console title: {}", e);
        }

        let guard = RawModeGuard::enable()?;
        Ok(ConsoleIo {
            input: Box::new(CrosstermInput { _raw: guard }),
            prompt: Box::new(TerminalPrompt),
            output: Box::new(stdout),
        })
    }
}

/// Terminal events translated for the send pump.
pub struct CrosstermInput {
    _raw: RawModeGuard,
}

impl ConsoleInput for CrosstermInput {
    fn wait(&mut self, signal: &TerminationSignal) -> io::Result<InputReady> {
        loop {
            if signal.is_set() {
                return Ok(InputReady::Terminated);
            }
            if event::poll(WAIT_SLICE)? {
                return Ok(InputReady::Events);
            }
        }
    }

    fn read_events(&mut self) -> io::Result<Vec<ConsoleEvent>> {
        let mut events = vec![keymap::translate(event::read()?)];
        while events.len() < BUF_SIZE && event::poll(Duration::ZERO)? {
            events.push(keymap::translate(event::read()?));
        }
        Ok(events)
    }

    fn pending_events(&mut self) -> io::Result<usize> {
        Ok(usize::from(event::poll(Duration::ZERO)?))
    }

    fn window_size(&self) -> io::Result<WindowSize> {
        let (cols, rows) = terminal::size()?;
        Ok(WindowSize::new(rows, cols))
    }
}

/// Asks on the terminal itself; raw mode is already on.
pub struct TerminalPrompt;

impl ExitPrompt for TerminalPrompt {
    fn confirm_exit(&mut self, signal: &TerminationSignal) -> io::Result<bool> {
        let mut stdout = io::stdout();
        write!(stdout, "\r\nLeave this serial session? [y/N] ")?;
        stdout.flush()?;

        let answer = loop {
            if signal.is_set() {
                debug!("Session stopped while asking to leave");
                break false;
            }
            if !event::poll(WAIT_SLICE)? {
                continue;
            }
            if let Some(answer) = exit_answer(&event::read()?) {
                break answer;
            }
        };

        write!(stdout, "{}\r\n", if answer { "y" } else { "n" })?;
        stdout.flush()?;
        Ok(answer)
    }
}

/// `Some(true)` for y/Y, `Some(false)` for any other key press, `None` for
/// releases and non-key events.
fn exit_answer(event: &Event) -> Option<bool> {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => {
            Some(matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')))
        }
        _ => None,
    }
}
