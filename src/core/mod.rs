//! Session core: pumps, redirectors and the seams to console and device.

pub mod console;
pub mod device;
pub mod failure;
pub mod pump;
pub mod resize;
pub mod session;
pub mod signal;

#[cfg(test)]
pub(crate) mod testing;

/// Chunk size for console reads, device reads and the write buffer.
pub const BUF_SIZE: usize = 256;
