//! Terminal-style rendering of streamed process output

mod buffer;

pub use buffer::TerminalBuffer;
