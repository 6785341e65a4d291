//! Little-endian binary buffer utilities for nethook dump decoding.
//!
//! # Overview
//!
//! - [`Reader`] - Reads binary data from a byte slice with cursor tracking.
//!   Every read is bounds-checked and reports how many bytes were missing.
//! - [`Writer`] - Writes binary data to an auto-growing buffer
//! - [`print_octets`] - Formats bytes as a space-separated hex preview
//!
//! # Example
//!
//! ```
//! use nethook_buffers::{Reader, Writer};
//!
//! let mut writer = Writer::new();
//! writer.u8(0x01);
//! writer.u16(0x0203);
//! writer.utf8("hello");
//! let data = writer.flush();
//!
//! let mut reader = Reader::new(&data);
//! assert_eq!(reader.u8().unwrap(), 0x01);
//! assert_eq!(reader.u16().unwrap(), 0x0203);
//! assert_eq!(reader.utf8(5).unwrap(), "hello");
//! assert!(reader.u8().is_err());
//! ```

mod print_octets;
mod reader;
mod writer;

pub use print_octets::{print_octets, print_octets_default};
pub use reader::Reader;
pub use writer::Writer;

use thiserror::Error;

/// Error type for buffer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Attempted to read past the end of the buffer.
    #[error("end of buffer at offset {offset}: needed {needed} bytes, {available} available")]
    EndOfBuffer {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// Invalid UTF-8 sequence.
    #[error("invalid UTF-8 sequence at offset {offset}")]
    InvalidUtf8 { offset: usize },
}
