//! The two worker loops of a session and the writer the send side owns.

pub mod receive;
pub mod send;
pub mod writer;

pub use receive::ReceivePump;
pub use send::{SendExit, SendPump};
pub use writer::AsyncWriter;
