//! Resize frames understood by the tty resizer on the peer side.
//!
//! A frame is `START rows SEPARATOR cols END`, decimal ASCII without
//! leading zeros, sent as one contiguous write. Anything that does not
//! parse decodes to [`ResizeCommand::Cancel`].

use crate::core::console::WindowSize;

pub const START_MARKER: u8 = 0x05;
pub const END_MARKER: u8 = b't';
pub const CANCEL_MARKER: u8 = b'c';
pub const SEPARATOR: u8 = b';';

/// Start marker, two u16 values, separator and end marker.
pub const MAX_FRAME_LEN: usize = 13;

/// Encode `size` as a resize frame.
pub fn encode(size: WindowSize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(MAX_FRAME_LEN);
    frame.push(START_MARKER);
    frame.extend_from_slice(size.rows.to_string().as_bytes());
    frame.push(SEPARATOR);
    frame.extend_from_slice(size.cols.to_string().as_bytes());
    frame.push(END_MARKER);
    frame
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeCommand {
    Resize(WindowSize),
    Cancel,
}

/// Streaming decoder fed one byte at a time.
#[derive(Debug, Default)]
pub struct ResizeFrameDecoder {
    body: Option<Vec<u8>>,
}

impl ResizeFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a frame has started but not ended.
    pub fn in_frame(&self) -> bool {
        self.body.is_some()
    }

    /// Feed one byte. Bytes outside a frame are ignored.
    pub fn feed(&mut self, byte: u8) -> Option<ResizeCommand> {
        let Some(body) = self.body.as_mut() else {
            if byte == START_MARKER {
                self.body = Some(Vec::with_capacity(MAX_FRAME_LEN));
            }
            return None;
        };

        match byte {
            START_MARKER => {
                // Previous frame was truncated; start over with this one.
                body.clear();
                Some(ResizeCommand::Cancel)
            }
            CANCEL_MARKER => {
                self.body = None;
                Some(ResizeCommand::Cancel)
            }
            END_MARKER => {
                let body = self.body.take().unwrap_or_default();
                Some(parse_body(&body).map_or(ResizeCommand::Cancel, ResizeCommand::Resize))
            }
            _ => {
                // Body excludes the start and end markers.
                if body.len() + 2 >= MAX_FRAME_LEN {
                    self.body = None;
                    return Some(ResizeCommand::Cancel);
                }
                body.push(byte);
                None
            }
        }
    }

    /// Drop a partially received frame, e.g. when the stream ends.
    pub fn reset(&mut self) -> Option<ResizeCommand> {
        self.body.take().map(|_| ResizeCommand::Cancel)
    }
}

fn parse_body(body: &[u8]) -> Option<WindowSize> {
    let split = body.iter().position(|b| *b == SEPARATOR)?;
    let rows = parse_dimension(&body[..split])?;
    let cols = parse_dimension(&body[split + 1..])?;
    Some(WindowSize::new(rows, cols))
}

fn parse_dimension(digits: &[u8]) -> Option<u16> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if digits.len() > 1 && digits[0] == b'0' {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}
